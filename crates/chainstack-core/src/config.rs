//! Client configuration.
//!
//! Loaded from YAML; every field has a default so an empty document is a
//! valid configuration.
//!
//! ```yaml
//! provider: ws://127.0.0.1:8546
//! request_timeout_ms: 30000
//! reconnect_interval_ms: 500
//! headers:
//!   Authorization: Bearer abc
//! chain_id: 3
//! fee:
//!   rate_per_byte: 100
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::ChainId;

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result alias for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Size-based fee heuristic.
///
/// `fee = (signed_len + unsigned_padding? + zero_fee_padding?) * rate_per_byte`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeePolicy {
    /// Base units charged per encoded byte.
    pub rate_per_byte: u64,
    /// Bytes added when the transaction carries no signature yet.
    pub unsigned_witness_bytes: u64,
    /// Bytes added when the stated fee is zero.
    pub zero_fee_padding_bytes: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            rate_per_byte: 100,
            unsigned_witness_bytes: 67,
            zero_fee_padding_bytes: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `http(s)://`, `ws(s)://` URL or IPC socket path.
    pub provider: String,
    /// Per-request timeout; absent means wait indefinitely.
    pub request_timeout_ms: Option<u64>,
    /// Whether streaming transports reconnect after the connection drops.
    pub reconnect: bool,
    pub reconnect_interval_ms: u64,
    /// How long a partial inbound frame may wait for its remainder.
    pub chunk_timeout_ms: u64,
    /// Extra HTTP headers sent with every request.
    pub headers: BTreeMap<String, String>,
    pub chain_id: ChainId,
    /// Prefix of the `<domain>_subscribe` and `<domain>_unsubscribe` methods.
    pub subscription_domain: String,
    /// Cheap method used by the connectivity probe.
    pub probe_method: String,
    pub fee: FeePolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            provider: "http://127.0.0.1:8545".to_string(),
            request_timeout_ms: None,
            reconnect: true,
            reconnect_interval_ms: 500,
            chunk_timeout_ms: 15_000,
            headers: BTreeMap::new(),
            chain_id: ChainId::DEFAULT,
            subscription_domain: "chainstack".to_string(),
            probe_method: "chainstack_currentBlock".to_string(),
            fee: FeePolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }
}
