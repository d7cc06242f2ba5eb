//! Transports: stateless HTTP and multiplexed streaming connections.

pub mod http;
pub mod ipc;
pub mod stream;
pub mod ws;

use serde_json::Value;
use tokio::sync::{mpsc, watch};

use chainstack_core::ClientConfig;

use crate::error::{Result, RpcError};
use crate::types::RequestPayload;

pub use self::http::HttpTransport;
pub use self::ipc::IpcConnector;
pub use self::stream::{Connection, ConnectionState, Connector, Multiplexer, StreamOptions};
pub use self::ws::WsConnector;

/// Kind of provider a path names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Http,
    WebSocket,
    Ipc,
}

/// Detects the provider kind from its path.
///
/// `http(s)://` and `ws(s)://` URLs map to their schemes; absolute or
/// relative filesystem paths, `.ipc`/`.sock` files and Windows named pipes
/// map to IPC.
pub fn detect_provider(path: &str) -> Result<ProviderKind> {
    let lower = path.trim().to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(ProviderKind::Http)
    } else if lower.starts_with("ws://") || lower.starts_with("wss://") {
        Ok(ProviderKind::WebSocket)
    } else if lower.starts_with('/')
        || lower.starts_with("./")
        || lower.starts_with("../")
        || lower.starts_with(r"\\.\pipe\")
        || lower.ends_with(".ipc")
        || lower.ends_with(".sock")
    {
        Ok(ProviderKind::Ipc)
    } else {
        Err(RpcError::InvalidProviderPath(path.to_string()))
    }
}

/// The connection a client talks through.
#[derive(Debug, Clone)]
pub enum Transport {
    Http(HttpTransport),
    Streaming(Multiplexer),
}

impl Transport {
    /// Builds the transport named by `config.provider`. Streaming transports
    /// start connecting immediately, so this must run inside a tokio runtime.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let provider = config.provider.trim();
        let options = StreamOptions {
            reconnect: config.reconnect,
            reconnect_interval: config.reconnect_interval(),
            chunk_timeout: config.chunk_timeout(),
            request_timeout: config.request_timeout(),
        };
        Ok(match detect_provider(provider)? {
            ProviderKind::Http => Self::Http(
                HttpTransport::with_url(provider)
                    .with_headers(&config.headers)?
                    .with_timeout(config.request_timeout()),
            ),
            ProviderKind::WebSocket => Self::Streaming(Multiplexer::spawn(
                WsConnector::new(provider).with_headers(config.headers.clone()),
                options,
            )),
            ProviderKind::Ipc => {
                Self::Streaming(Multiplexer::spawn(IpcConnector::new(provider), options))
            }
        })
    }

    pub async fn send(&self, payload: &RequestPayload) -> Result<Value> {
        match self {
            Self::Http(http) => http.send(payload).await,
            Self::Streaming(mux) => mux.send(payload).await,
        }
    }

    pub fn supports_subscriptions(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }

    /// Notification feed; HTTP has none.
    pub fn notifications(&self) -> Result<mpsc::UnboundedReceiver<Value>> {
        match self {
            Self::Http(_) => Err(RpcError::UnsupportedSubscriptions),
            Self::Streaming(mux) => mux.notifications(),
        }
    }

    /// State feed for streaming transports.
    pub fn watch_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        match self {
            Self::Http(_) => None,
            Self::Streaming(mux) => Some(mux.watch_state()),
        }
    }

    /// Connections opened so far; always 0 for HTTP.
    pub fn generation(&self) -> u64 {
        match self {
            Self::Http(_) => 0,
            Self::Streaming(mux) => mux.generation(),
        }
    }

    /// Fails in-flight requests and drops notification handlers. No-op for
    /// HTTP.
    pub fn reset(&self) -> Result<()> {
        match self {
            Self::Http(_) => Ok(()),
            Self::Streaming(mux) => mux.reset(),
        }
    }

    pub fn reconnect(&self) -> Result<()> {
        match self {
            Self::Http(_) => Ok(()),
            Self::Streaming(mux) => mux.reconnect(),
        }
    }

    pub fn close(&self) -> Result<()> {
        match self {
            Self::Http(_) => Ok(()),
            Self::Streaming(mux) => mux.close(),
        }
    }
}
