//! Subscriptions over a streaming transport.
//!
//! A [`Subscription`] is a handle; the registry entry it points at holds the
//! server-assigned id and the sender half of the caller's event stream. A
//! router task owns the transport's notification feed, delivers each
//! notification to the matching entry, and re-issues subscriptions after
//! the connection comes back.

use std::collections::{HashMap, VecDeque};
use std::sync::Weak;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::client::{Client, ClientInner};
use crate::error::{Result, RpcError};
use crate::transport::ConnectionState;
use crate::types::id_key;

/// Notifications for unknown ids kept for a subscription that is still
/// being activated.
const MAX_ORPHANS: usize = 64;

/// Item delivered on a subscription's event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// One notification result. Array results are delivered item by item.
    Data(Value),
    /// The subscription failed or lost its connection.
    Error(RpcError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Not subscribed yet, or a subscribe call is in flight.
    Pending,
    Active,
    /// Connection lost; waiting for it to come back.
    Disconnected,
    Resubscribing,
    Unsubscribed,
}

struct Entry {
    name: String,
    params: Vec<Value>,
    server_id: Option<String>,
    /// Connection generation the server id belongs to.
    generation: u64,
    state: SubscriptionState,
    events: mpsc::UnboundedSender<SubscriptionEvent>,
}

impl Entry {
    fn emit(&self, event: SubscriptionEvent) {
        let _ = self.events.send(event);
    }

    fn deliver(&self, result: Value) {
        match result {
            Value::Array(items) => items
                .into_iter()
                .for_each(|item| self.emit(SubscriptionEvent::Data(item))),
            other => self.emit(SubscriptionEvent::Data(other)),
        }
    }
}

/// Live subscriptions keyed by a local id.
#[derive(Default)]
pub(crate) struct Registry {
    next_local_id: u64,
    entries: HashMap<u64, Entry>,
    orphans: VecDeque<(String, Value)>,
}

impl Registry {
    pub(crate) fn insert(
        &mut self,
        name: String,
        events: mpsc::UnboundedSender<SubscriptionEvent>,
    ) -> u64 {
        self.next_local_id += 1;
        self.entries.insert(
            self.next_local_id,
            Entry {
                name,
                params: Vec::new(),
                server_id: None,
                generation: 0,
                state: SubscriptionState::Pending,
                events,
            },
        );
        self.next_local_id
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes entries whose name matches, returning their server ids.
    pub(crate) fn drain_where(&mut self, mut matches: impl FnMut(&str) -> bool) -> Vec<Option<String>> {
        let ids: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| matches(entry.name.as_str()))
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .map(|entry| entry.server_id)
            .collect()
    }

    fn remove(&mut self, local_id: u64) -> Option<Entry> {
        self.entries.remove(&local_id)
    }

    fn server_id(&self, local_id: u64) -> Option<String> {
        self.entries.get(&local_id).and_then(|e| e.server_id.clone())
    }

    fn state(&self, local_id: u64) -> SubscriptionState {
        self.entries
            .get(&local_id)
            .map_or(SubscriptionState::Unsubscribed, |e| e.state)
    }

    /// Clears the server id and moves to `state`, returning the old id.
    fn detach(&mut self, local_id: u64, state: SubscriptionState) -> Option<String> {
        let entry = self.entries.get_mut(&local_id)?;
        entry.state = state;
        entry.server_id.take()
    }

    fn begin(&mut self, local_id: u64, params: Vec<Value>) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&local_id)
            .ok_or(RpcError::InvalidConnection("subscription removed".into()))?;
        entry.params = params;
        entry.state = SubscriptionState::Pending;
        Ok(())
    }

    /// Records the server id and replays notifications that beat it here.
    fn activate(&mut self, local_id: u64, server_id: String, generation: u64) {
        let Some(entry) = self.entries.get_mut(&local_id) else {
            return;
        };
        entry.server_id = Some(server_id.clone());
        entry.generation = generation;
        entry.state = SubscriptionState::Active;

        let (early, rest): (VecDeque<_>, VecDeque<_>) = self
            .orphans
            .drain(..)
            .partition(|(id, _)| *id == server_id);
        self.orphans = rest;
        if let Some(entry) = self.entries.get(&local_id) {
            for (_, result) in early {
                entry.deliver(result);
            }
        }
    }

    fn fail(&mut self, local_id: u64, error: RpcError, state: SubscriptionState) {
        if let Some(entry) = self.entries.get_mut(&local_id) {
            entry.state = state;
            entry.emit(SubscriptionEvent::Error(error));
        }
    }

    fn dispatch(&mut self, notification: &Value) {
        let Some(params) = notification.get("params") else {
            return;
        };
        let Some(server_id) = params.get("subscription").map(id_key) else {
            return;
        };
        let result = params.get("result").cloned().unwrap_or(Value::Null);

        match self
            .entries
            .values()
            .find(|e| e.server_id.as_deref() == Some(server_id.as_str()))
        {
            Some(entry) => entry.deliver(result),
            None => {
                debug!(subscription = %server_id, "buffering notification for unknown subscription");
                if self.orphans.len() == MAX_ORPHANS {
                    self.orphans.pop_front();
                }
                self.orphans.push_back((server_id, result));
            }
        }
    }

    /// Marks active entries disconnected and tells their listeners.
    fn disconnect_all(&mut self, error: &RpcError) {
        for entry in self.entries.values_mut() {
            if matches!(
                entry.state,
                SubscriptionState::Active | SubscriptionState::Resubscribing
            ) {
                entry.server_id = None;
                entry.state = SubscriptionState::Disconnected;
                entry.emit(SubscriptionEvent::Error(error.clone()));
            }
        }
        self.orphans.clear();
    }

    /// Marks entries activated on an older connection disconnected.
    ///
    /// Catches reconnects whose intermediate states were never observed.
    fn disconnect_stale(&mut self, generation: u64, error: &RpcError) {
        let mut stale = false;
        for entry in self.entries.values_mut() {
            if entry.state == SubscriptionState::Active && entry.generation < generation {
                entry.server_id = None;
                entry.state = SubscriptionState::Disconnected;
                entry.emit(SubscriptionEvent::Error(error.clone()));
                stale = true;
            }
        }
        if stale {
            self.orphans.clear();
        }
    }

    /// Entries to re-issue after a reconnect, marked as resubscribing.
    fn take_disconnected(&mut self) -> Vec<(u64, String, Vec<Value>)> {
        self.entries
            .iter_mut()
            .filter(|(_, e)| e.state == SubscriptionState::Disconnected)
            .map(|(id, e)| {
                e.state = SubscriptionState::Resubscribing;
                (*id, e.name.clone(), e.params.clone())
            })
            .collect()
    }
}

/// Handle to one logical subscription.
///
/// Dropping the handle removes the subscription and, inside a runtime,
/// unsubscribes it on the node in the background.
#[derive(Debug)]
pub struct Subscription {
    client: Client,
    local_id: u64,
    name: String,
    params_num: usize,
}

impl Subscription {
    pub(crate) fn new(client: Client, local_id: u64, name: String, params_num: usize) -> Self {
        Self {
            client,
            local_id,
            name,
            params_num,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server-assigned id while active.
    pub fn id(&self) -> Option<String> {
        self.client.registry().server_id(self.local_id)
    }

    pub fn state(&self) -> SubscriptionState {
        self.client.registry().state(self.local_id)
    }

    /// Subscribes with `params`, replacing any earlier server subscription
    /// held by this handle. Returns the new server id.
    pub async fn subscribe(&mut self, params: Vec<Value>) -> Result<String> {
        if params.len() != self.params_num {
            return Err(RpcError::InvalidNumberOfParams {
                method: self.name.clone(),
                got: params.len(),
                expected: self.params_num,
            });
        }
        if !self.client.transport().supports_subscriptions() {
            return Err(RpcError::UnsupportedSubscriptions);
        }
        self.client.ensure_router()?;

        let previous = self
            .client
            .registry()
            .detach(self.local_id, SubscriptionState::Pending);
        if let Some(previous) = previous {
            debug!(subscription = %previous, name = %self.name, "replacing subscription");
            if let Err(e) = self.client.unsubscribe_id(&previous).await {
                warn!(subscription = %previous, error = %e, "unsubscribe of replaced subscription failed");
            }
        }

        self.client.registry().begin(self.local_id, params.clone())?;
        match issue(&self.client, &self.name, params).await {
            Ok(server_id) => {
                let generation = self.client.transport().generation();
                self.client
                    .registry()
                    .activate(self.local_id, server_id.clone(), generation);
                debug!(subscription = %server_id, name = %self.name, "subscribed");
                Ok(server_id)
            }
            Err(e) => {
                self.client
                    .registry()
                    .fail(self.local_id, e.clone(), SubscriptionState::Pending);
                Err(e)
            }
        }
    }

    /// Stops delivery and removes the subscription on the node.
    ///
    /// Returns the node's answer, or `false` when nothing was subscribed.
    pub async fn unsubscribe(&mut self) -> Result<bool> {
        let server_id = self
            .client
            .registry()
            .detach(self.local_id, SubscriptionState::Unsubscribed);
        match server_id {
            Some(server_id) => self.client.unsubscribe_id(&server_id).await,
            None => Ok(false),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let server_id = self
            .client
            .registry()
            .remove(self.local_id)
            .and_then(|entry| entry.server_id);
        let (Some(server_id), Ok(runtime)) = (server_id, tokio::runtime::Handle::try_current())
        else {
            return;
        };
        let client = self.client.clone();
        runtime.spawn(async move {
            if let Err(e) = client.unsubscribe_id(&server_id).await {
                debug!(subscription = %server_id, error = %e, "unsubscribe on drop failed");
            }
        });
    }
}

/// Sends `<domain>_subscribe [name, ...params]` and returns the server id.
async fn issue(client: &Client, name: &str, params: Vec<Value>) -> Result<String> {
    let mut full = Vec::with_capacity(params.len() + 1);
    full.push(Value::String(name.to_string()));
    full.extend(params);
    match client.send(&client.subscribe_method(), full).await? {
        Value::String(id) => Ok(id),
        other => Err(RpcError::InvalidResponse(other)),
    }
}

/// Router task: delivers notifications and reacts to connection changes.
pub(crate) async fn route(
    client: Weak<ClientInner>,
    mut notifications: mpsc::UnboundedReceiver<Value>,
    mut state: Option<watch::Receiver<ConnectionState>>,
) {
    loop {
        tokio::select! {
            notification = notifications.recv() => {
                let Some(notification) = notification else { break };
                let Some(inner) = client.upgrade() else { break };
                inner.registry().dispatch(&notification);
            }
            transition = next_state(&mut state) => {
                let Some(current) = transition else {
                    state = None;
                    continue;
                };
                let Some(inner) = client.upgrade() else { break };
                let error = RpcError::InvalidConnection(inner.endpoint());
                let live = Client { inner };
                if current == ConnectionState::Open {
                    // state changes coalesce; the generation tells whether
                    // the connection was replaced in between
                    let generation = live.transport().generation();
                    live.registry().disconnect_stale(generation, &error);
                    resubscribe(live);
                } else {
                    live.registry().disconnect_all(&error);
                }
            }
        }
    }
    debug!("subscription router stopped");
}

/// Resolves with the next state, or `None` once no more changes can come.
async fn next_state(state: &mut Option<watch::Receiver<ConnectionState>>) -> Option<ConnectionState> {
    match state {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow_and_update()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

fn resubscribe(client: Client) {
    let entries = client.registry().take_disconnected();
    for (local_id, name, params) in entries {
        let client = client.clone();
        tokio::spawn(async move {
            info!(name = %name, "resubscribing after reconnect");
            match issue(&client, &name, params).await {
                Ok(server_id) => {
                    let generation = client.transport().generation();
                    client.registry().activate(local_id, server_id, generation);
                }
                Err(e) => {
                    warn!(name = %name, error = %e, "resubscribe failed");
                    client
                        .registry()
                        .fail(local_id, e, SubscriptionState::Disconnected);
                }
            }
        });
    }
}
