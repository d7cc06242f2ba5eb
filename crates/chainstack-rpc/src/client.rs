//! JSON-RPC client over any [`Transport`].
//!
//! Correlates requests and responses, validates responses, and owns the
//! subscription registry plus the task that routes notifications into it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use chainstack_core::{ByteString, ClientConfig};

use crate::batch::Batch;
use crate::correlator::{is_valid_response, Correlator};
use crate::error::{Result, RpcError};
use crate::subscription::{self, Registry, Subscription, SubscriptionEvent};
use crate::transport::Transport;
use crate::types::{error_member, id_key, RequestPayload};

/// Method that submits a signed transaction given as `0x` hex.
pub const SEND_RAW_TRANSACTION: &str = "chainstack_newTransaction";

/// Subscription name exempt from [`Client::clear_subscriptions`] when asked.
pub const SYNCING_SUBSCRIPTION: &str = "syncing";

/// Cheap to clone; clones share the connection, id counter and
/// subscriptions.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    transport: Transport,
    correlator: Correlator,
    config: ClientConfig,
    registry: Mutex<Registry>,
    router: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(router) = self.router.get_mut().ok().and_then(Option::take) {
            router.abort();
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("provider", &self.inner.config.provider)
            .field("transport", &self.inner.transport)
            .finish()
    }
}

impl Client {
    /// Builds a client for `config.provider`.
    ///
    /// Streaming providers start connecting right away; call this inside a
    /// tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = Transport::from_config(&config)?;
        Ok(Self::from_parts(transport, Correlator::new(), config))
    }

    /// Client for `provider` with default settings.
    pub fn connect(provider: impl Into<String>) -> Result<Self> {
        Self::new(ClientConfig::default().with_provider(provider))
    }

    /// Assembles a client from an existing transport and id counter.
    pub fn from_parts(transport: Transport, correlator: Correlator, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                correlator,
                config,
                registry: Mutex::new(Registry::default()),
                router: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    pub fn correlator(&self) -> &Correlator {
        &self.inner.correlator
    }

    /// Sends one request and returns its `result`.
    pub async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let request = self.inner.correlator.to_payload(method, params)?;
        let id = request.id.clone();
        let response = self
            .inner
            .transport
            .send(&RequestPayload::Single(request))
            .await?;
        extract_result(&id, response)
    }

    /// [`Client::send`] with the result deserialized into `T`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let result = self.send(method, params).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Broadcasts a signed, RLP-encoded transaction.
    pub async fn send_raw_transaction(&self, raw: &ByteString) -> Result<Value> {
        self.send(SEND_RAW_TRANSACTION, vec![Value::String(raw.to_hex())])
            .await
    }

    /// Whether the node answers the configured probe call.
    pub async fn is_connected(&self) -> bool {
        match self.send(&self.inner.config.probe_method, Vec::new()).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "connectivity probe failed");
                false
            }
        }
    }

    /// Starts an empty batch.
    pub fn batch(&self) -> Batch {
        Batch::new(self.clone())
    }

    /// Creates a subscription handle for the logical stream `name`, which
    /// takes exactly `params_num` parameters. Nothing is sent until
    /// [`Subscription::subscribe`].
    pub fn subscription(
        &self,
        name: impl Into<String>,
        params_num: usize,
    ) -> (Subscription, mpsc::UnboundedReceiver<SubscriptionEvent>) {
        let name = name.into();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let local_id = self.registry().insert(name.clone(), events_tx);
        (
            Subscription::new(self.clone(), local_id, name, params_num),
            events_rx,
        )
    }

    /// Unsubscribes and forgets every subscription, optionally sparing
    /// those named `syncing`, then resets the transport.
    ///
    /// Resetting fails in-flight requests and drops notification handlers;
    /// the router is restarted for any subscriptions that remain.
    pub async fn clear_subscriptions(&self, keep_syncing: bool) -> Result<()> {
        let removed = self
            .registry()
            .drain_where(|name| !(keep_syncing && name == SYNCING_SUBSCRIPTION));
        for server_id in removed.into_iter().flatten() {
            if let Err(e) = self.unsubscribe_id(&server_id).await {
                warn!(subscription = %server_id, error = %e, "unsubscribe failed");
            }
        }

        self.stop_router();
        self.inner.transport.reset()?;
        if !self.registry().is_empty() {
            self.ensure_router()?;
        }
        Ok(())
    }

    /// Closes a streaming connection. Pending requests fail.
    pub fn close(&self) -> Result<()> {
        self.stop_router();
        self.inner.transport.close()
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.registry()
    }

    pub(crate) fn subscribe_method(&self) -> String {
        format!("{}_subscribe", self.inner.config.subscription_domain)
    }

    pub(crate) fn unsubscribe_method(&self) -> String {
        format!("{}_unsubscribe", self.inner.config.subscription_domain)
    }

    pub(crate) async fn unsubscribe_id(&self, server_id: &str) -> Result<bool> {
        let result = self
            .send(
                &self.unsubscribe_method(),
                vec![Value::String(server_id.to_string())],
            )
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// Starts the notification router unless one is already running.
    pub(crate) fn ensure_router(&self) -> Result<()> {
        let mut slot = self
            .inner
            .router
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }
        let notifications = self.inner.transport.notifications()?;
        let state = self.inner.transport.watch_state();
        let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
        *slot = Some(tokio::spawn(subscription::route(weak, notifications, state)));
        Ok(())
    }

    fn stop_router(&self) {
        let mut slot = self
            .inner
            .router
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(task) = slot.take() {
            task.abort();
        }
    }
}

impl ClientInner {
    pub(crate) fn endpoint(&self) -> String {
        self.config.provider.clone()
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Checks a single response against the request id and returns `result`.
pub(crate) fn extract_result(request_id: &Value, response: Value) -> Result<Value> {
    let response_id = response.get("id").cloned().unwrap_or(Value::Null);
    if response_id.is_null() || id_key(&response_id) != id_key(request_id) {
        return Err(RpcError::WrongResponseId {
            expected: request_id.clone(),
            got: response_id,
        });
    }
    if let Some(error) = error_member(&response) {
        return Err(RpcError::from_error_object(error));
    }
    if !is_valid_response(&response) {
        return Err(RpcError::InvalidResponse(response));
    }
    match response {
        Value::Object(mut object) => Ok(object.remove("result").unwrap_or(Value::Null)),
        other => Err(RpcError::InvalidResponse(other)),
    }
}
