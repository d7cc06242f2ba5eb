//! JSON-RPC 2.0 frame types.
//!
//! Request:
//! ```json
//! {"id":1,"jsonrpc":"2.0","method":"chainstack_currentBlock","params":[]}
//! ```
//!
//! Notification pushed for a live subscription:
//! ```json
//! {"jsonrpc":"2.0","method":"chainstack_subscription","params":{"subscription":"0x9f","result":{}}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version carried by every frame.
pub const JSONRPC_VERSION: &str = "2.0";

/// Suffix of the `method` of a subscription notification.
pub const SUBSCRIPTION_SUFFIX: &str = "_subscription";

/// JSON-RPC 2.0 request object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub id: Value,
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// A single request or a batch, as written to the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RequestPayload {
    Single(JsonRpcRequest),
    Batch(Vec<JsonRpcRequest>),
}

impl RequestPayload {
    /// Id the response is correlated by: the request's id, or the first id
    /// of a batch.
    pub fn correlation_id(&self) -> Option<&Value> {
        match self {
            Self::Single(request) => Some(&request.id),
            Self::Batch(requests) => requests.first().map(|r| &r.id),
        }
    }

    /// Method name for diagnostics.
    pub fn method(&self) -> &str {
        match self {
            Self::Single(request) => &request.method,
            Self::Batch(requests) => requests.first().map_or("", |r| r.method.as_str()),
        }
    }
}

/// JSON-RPC 2.0 response object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response.
    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Key under which a pending request is tracked.
///
/// Numeric and string ids with the same text share a key.
pub fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The frame's `error` member. `"error": null` counts as absent.
pub fn error_member(frame: &Value) -> Option<&Value> {
    frame.get("error").filter(|error| !error.is_null())
}

/// Whether `frame` is a subscription notification rather than a response.
pub fn is_notification(frame: &Value) -> bool {
    let has_id = frame.get("id").is_some_and(|id| !id.is_null());
    !has_id
        && frame
            .get("method")
            .and_then(Value::as_str)
            .is_some_and(|m| m.ends_with(SUBSCRIPTION_SUFFIX))
}
