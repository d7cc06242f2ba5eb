//! HTTP transport: one POST per request or batch.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, RpcError};
use crate::types::{error_member, RequestPayload};

/// Default endpoint when none is configured.
pub const DEFAULT_HTTP_URL: &str = "http://localhost:8545";

/// Stateless HTTP JSON-RPC transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::with_url(DEFAULT_HTTP_URL)
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            headers: HeaderMap::new(),
            timeout: None,
        }
    }

    /// Adds headers sent with every request.
    pub fn with_headers(mut self, headers: &BTreeMap<String, String>) -> Result<Self> {
        for (name, value) in headers {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RpcError::InvalidConfig(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| RpcError::InvalidConfig(format!("header {name}: {e}")))?;
            self.headers.insert(header, value);
        }
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POSTs `payload` and returns the decoded body.
    ///
    /// 400 and 500 responses carrying a JSON-RPC error object become
    /// [`RpcError::ResponseError`]; any other failure is a connection error.
    pub async fn send(&self, payload: &RequestPayload) -> Result<Value> {
        debug!(url = %self.url, method = payload.method(), "POST");
        let mut request = self
            .client
            .post(self.url.as_str())
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(payload);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| self.map_error(e));
        }

        if status == StatusCode::BAD_REQUEST || status == StatusCode::INTERNAL_SERVER_ERROR {
            let body: Value = response.json().await.map_err(|e| self.map_error(e))?;
            if let Some(error) = error_member(&body) {
                return Err(RpcError::from_error_object(error));
            }
            return Err(RpcError::InvalidResponse(body));
        }

        Err(RpcError::InvalidConnection(format!("{} (HTTP {status})", self.url)))
    }

    fn map_error(&self, e: reqwest::Error) -> RpcError {
        if e.is_timeout() {
            let ms = self.timeout.map_or(0, |t| t.as_millis() as u64);
            RpcError::ConnectionTimeout(ms)
        } else if e.is_decode() {
            RpcError::Serde(e.to_string())
        } else {
            RpcError::InvalidConnection(format!("{}: {e}", self.url))
        }
    }
}
