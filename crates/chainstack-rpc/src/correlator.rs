//! Request id allocation and response validation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Result, RpcError};
use crate::types::{error_member, JsonRpcRequest, RequestPayload, JSONRPC_VERSION};

/// Builds request frames with ids from a shared, monotonically increasing
/// counter.
///
/// Clones share the counter, so two clients built from the same correlator
/// never hand out the same id.
#[derive(Debug, Clone)]
pub struct Correlator {
    next_id: Arc<AtomicU64>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(first)),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Wraps `method` and `params` in a request object with a fresh id.
    pub fn to_payload(&self, method: &str, params: Vec<Value>) -> Result<JsonRpcRequest> {
        if method.is_empty() {
            return Err(RpcError::MissingMethod);
        }
        Ok(JsonRpcRequest {
            id: Value::from(self.next_id()),
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        })
    }

    /// Builds a batch, allocating ids in message order.
    pub fn to_batch_payload<I, S>(&self, messages: I) -> Result<RequestPayload>
    where
        I: IntoIterator<Item = (S, Vec<Value>)>,
        S: AsRef<str>,
    {
        let requests = messages
            .into_iter()
            .map(|(method, params)| self.to_payload(method.as_ref(), params))
            .collect::<Result<Vec<_>>>()?;
        Ok(RequestPayload::Batch(requests))
    }
}

/// Whether `response` is a well-formed success response, or an array of them.
///
/// A valid response is an object with `jsonrpc == "2.0"`, a number or string
/// id, a `result` member (which may be null) and no non-null `error` member.
pub fn is_valid_response(response: &Value) -> bool {
    match response {
        Value::Array(items) => items.iter().all(is_valid_single),
        other => is_valid_single(other),
    }
}

fn is_valid_single(response: &Value) -> bool {
    let Some(object) = response.as_object() else {
        return false;
    };
    error_member(response).is_none()
        && object.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION)
        && matches!(object.get("id"), Some(Value::Number(_) | Value::String(_)))
        && object.contains_key("result")
}
