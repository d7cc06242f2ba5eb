//! JSON-RPC batches: several calls in one array frame.

use serde_json::Value;

use crate::client::Client;
use crate::correlator::is_valid_response;
use crate::error::{Result, RpcError};
use crate::types::{error_member, id_key, RequestPayload};

/// Collects calls and sends them as a single batch.
#[derive(Debug)]
pub struct Batch {
    client: Client,
    requests: Vec<(String, Vec<Value>)>,
}

impl Batch {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            requests: Vec::new(),
        }
    }

    pub fn add(&mut self, method: impl Into<String>, params: Vec<Value>) -> &mut Self {
        self.requests.push((method.into(), params));
        self
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Sends the batch.
    ///
    /// Fails as a whole when the transport call fails or the reply is not an
    /// array; otherwise yields one result per call, in the order added.
    pub async fn execute(self) -> Result<Vec<Result<Value>>> {
        if self.requests.is_empty() {
            return Ok(Vec::new());
        }
        let payload = self
            .client
            .correlator()
            .to_batch_payload(self.requests)?;
        let RequestPayload::Batch(requests) = &payload else {
            return Err(RpcError::InvalidConfig("batch payload expected".into()));
        };
        let ids: Vec<Value> = requests.iter().map(|r| r.id.clone()).collect();

        let response = self.client.transport().send(&payload).await?;
        let Value::Array(items) = response else {
            return Err(RpcError::InvalidResponse(response));
        };
        Ok(match_responses(&ids, items))
    }
}

/// Pairs responses with request ids, falling back to position for
/// responses without a usable id.
fn match_responses(ids: &[Value], items: Vec<Value>) -> Vec<Result<Value>> {
    let mut slots: Vec<Option<Value>> = vec![None; ids.len()];
    let mut unmatched = Vec::new();
    for item in items {
        let position = item
            .get("id")
            .map(id_key)
            .and_then(|key| ids.iter().position(|id| id_key(id) == key));
        match position {
            Some(i) if slots[i].is_none() => slots[i] = Some(item),
            _ => unmatched.push(item),
        }
    }
    let mut unmatched = unmatched.into_iter();
    for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
        *slot = unmatched.next();
    }

    slots.into_iter().map(classify).collect()
}

fn classify(item: Option<Value>) -> Result<Value> {
    let item = item.unwrap_or(Value::Null);
    if let Some(error) = error_member(&item) {
        return Err(RpcError::from_error_object(error));
    }
    if !is_valid_response(&item) {
        return Err(RpcError::InvalidResponse(item));
    }
    match item {
        Value::Object(mut object) => Ok(object.remove("result").unwrap_or(Value::Null)),
        other => Err(RpcError::InvalidResponse(other)),
    }
}
