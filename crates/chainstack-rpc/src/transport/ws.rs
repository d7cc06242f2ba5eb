//! WebSocket connector.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

use super::stream::{Connection, Connector};
use crate::error::{Result, RpcError};

/// Connects to a `ws://` or `wss://` endpoint, sending frames as text
/// messages.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    headers: BTreeMap<String, String>,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Extra headers for the upgrade request.
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Connection> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| RpcError::InvalidConfig(format!("{}: {e}", self.url)))?;
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RpcError::InvalidConfig(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| RpcError::InvalidConfig(format!("header {name}: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| RpcError::InvalidConnection(format!("{}: {e}", self.url)))?;
        let (sink, stream) = socket.split();

        let sink = sink
            .sink_map_err(|e| RpcError::InvalidConnection(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, RpcError>(Message::Text(text))));
        let stream = stream.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => Some(
                    String::from_utf8(bytes)
                        .map_err(|e| RpcError::InvalidResponse(e.to_string().into())),
                ),
                Ok(_) => None,
                Err(e) => Some(Err(RpcError::InvalidConnection(e.to_string()))),
            })
        });

        Ok(Connection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}
