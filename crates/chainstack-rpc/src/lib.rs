//! # chainstack-rpc
//!
//! JSON-RPC 2.0 client plumbing for chainstack nodes.
//!
//! - [`Correlator`] builds request frames with ids from a shared counter.
//! - [`Transport`] is either stateless HTTP or a [`Multiplexer`] that shares
//!   one WebSocket or IPC connection between concurrent requests and
//!   subscriptions.
//! - [`Client`] validates responses, builds [`Batch`]es and hands out
//!   [`Subscription`]s that are re-issued after a reconnect.

pub mod batch;
pub mod client;
pub mod correlator;
pub mod error;
pub mod frame;
pub mod subscription;
pub mod transport;
pub mod types;

pub use batch::Batch;
pub use client::{Client, SEND_RAW_TRANSACTION};
pub use correlator::{is_valid_response, Correlator};
pub use error::{Result, RpcError};
pub use subscription::{Subscription, SubscriptionEvent, SubscriptionState};
pub use transport::{
    detect_provider, ConnectionState, Connector, HttpTransport, IpcConnector, Multiplexer,
    ProviderKind, StreamOptions, Transport, WsConnector,
};
pub use types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestPayload, JSONRPC_VERSION};
