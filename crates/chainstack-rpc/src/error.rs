use serde_json::Value;
use thiserror::Error;

/// Errors from JSON-RPC calls, transports and subscriptions.
///
/// Cloneable so one connection failure can be delivered to every pending
/// caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    #[error("JSON-RPC method name is missing")]
    MissingMethod,
    #[error("invalid number of parameters for \"{method}\": got {got}, expected {expected}")]
    InvalidNumberOfParams {
        method: String,
        got: usize,
        expected: usize,
    },
    #[error("can't autodetect provider for \"{0}\"")]
    InvalidProviderPath(String),
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
    #[error("CONNECTION ERROR: couldn't connect to node {0}")]
    InvalidConnection(String),
    #[error("CONNECTION TIMEOUT: timeout of {0} ms achieved")]
    ConnectionTimeout(u64),
    #[error("invalid JSON RPC response: {0}")]
    InvalidResponse(Value),
    #[error("returned error: {message} (code {code})")]
    ResponseError {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("wrong response id {got} (expected: {expected})")]
    WrongResponseId { expected: Value, got: Value },
    #[error("the current provider doesn't support subscriptions")]
    UnsupportedSubscriptions,
    #[error("request id {0} is already pending")]
    DuplicateRequestId(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

impl RpcError {
    /// Builds a [`RpcError::ResponseError`] from a JSON-RPC `error` member.
    pub fn from_error_object(error: &Value) -> Self {
        let message = match error.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => error.to_string(),
        };
        Self::ResponseError {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message,
            data: error.get("data").cloned(),
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}

/// Result alias for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;
