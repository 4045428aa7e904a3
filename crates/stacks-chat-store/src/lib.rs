//! In-memory realtime store backend.
//!
//! [`MemoryStore`] is one shared JSON tree with the full realtime contract
//! the chat core expects: last-writer-wins path writes, atomic multi-path
//! commits, live snapshot subscriptions, strictly increasing push ids,
//! server-assigned timestamps and on-disconnect hooks.
//!
//! Each [`MemoryStoreClient`] is one client connection (one device).
//! Clients can be cut off abruptly with
//! [`drop_connection`](MemoryStoreClient::drop_connection): registered
//! disconnect payloads fire exactly once and the client's listeners are
//! severed, just like a crashed app. They can also be taken through a transient outage
//! with [`set_available`](MemoryStoreClient::set_available). That makes the
//! backend double as the harness for cross-client behavior tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use stacks_chat_core::error::{ChatError, Result};
use stacks_chat_core::store::{StoreAdapter, Subscription};

/// Shared in-memory realtime tree.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    root: Value,
    listeners: Vec<Listener>,
    next_listener: u64,
    disconnect_payloads: HashMap<Uuid, Vec<(String, Option<Value>)>>,
    seq: u64,
    last_ms: i64,
}

struct Listener {
    id: u64,
    client_id: Uuid,
    path: String,
    tx: mpsc::UnboundedSender<Option<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new client connection to this store.
    pub fn client(&self) -> MemoryStoreClient {
        MemoryStoreClient {
            shared: self.shared.clone(),
            client_id: Uuid::new_v4(),
            connected: Arc::new(AtomicBool::new(true)),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Current value at a path, for assertions in tests and tooling.
    pub fn value_at(&self, path: &str) -> Option<Value> {
        let state = self.shared.lock();
        node_at(&state.root, path).cloned()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StoreState {
    /// Applies every update and notifies listeners whose path overlaps a
    /// changed one. Runs under the state lock, so commits are serialized
    /// and every listener observes the same sequence of snapshots.
    fn commit(&mut self, updates: HashMap<String, Option<Value>>) {
        for (path, value) in &updates {
            set_at(&mut self.root, path, value.clone());
        }
        let changed: Vec<&String> = updates.keys().collect();
        self.listeners.retain(|listener| {
            if changed.iter().any(|path| paths_overlap(&listener.path, path)) {
                listener
                    .tx
                    .send(node_at(&self.root, &listener.path).cloned())
                    .is_ok()
            } else {
                true
            }
        });
    }

    fn next_server_time(&mut self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_millis();
        self.last_ms = if now > self.last_ms { now } else { self.last_ms + 1 };
        DateTime::from_timestamp_millis(self.last_ms).unwrap_or_else(Utc::now)
    }
}

/// One client connection to a [`MemoryStore`].
///
/// Clones share the same connection identity; handing one to the chat core
/// and keeping another for fault injection is the intended test pattern.
#[derive(Clone)]
pub struct MemoryStoreClient {
    shared: Arc<Shared>,
    client_id: Uuid,
    connected: Arc<AtomicBool>,
    available: Arc<AtomicBool>,
}

impl MemoryStoreClient {
    /// Simulates a transient outage: while unavailable every store call
    /// fails with `StoreUnavailable`. The connection itself stays up, so
    /// no disconnect payload fires.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Cuts the connection without any sign-off, as a crash or network
    /// loss would.
    ///
    /// Registered on-disconnect payloads are applied exactly once, this
    /// client's listeners are severed, and every later call on the client
    /// fails with `StoreUnavailable`. Calling it again is a no-op.
    pub fn drop_connection(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut state = self.shared.lock();
        state
            .listeners
            .retain(|listener| listener.client_id != self.client_id);
        let payload: HashMap<String, Option<Value>> = state
            .disconnect_payloads
            .remove(&self.client_id)
            .unwrap_or_default()
            .into_iter()
            .collect();
        tracing::debug!(client_id = %self.client_id, paths = payload.len(), "connection dropped");
        if !payload.is_empty() {
            state.commit(payload);
        }
    }

    fn guard(&self) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ChatError::store_unavailable("connection closed"));
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(ChatError::store_unavailable("client offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreAdapter for MemoryStoreClient {
    async fn read_once(&self, path: &str) -> Result<Option<Value>> {
        self.guard()?;
        let state = self.shared.lock();
        Ok(node_at(&state.root, path).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> Result<()> {
        self.guard()?;
        let mut state = self.shared.lock();
        let mut updates = HashMap::new();
        updates.insert(path.to_string(), Some(value));
        state.commit(updates);
        Ok(())
    }

    async fn atomic_update(&self, updates: HashMap<String, Option<Value>>) -> Result<()> {
        self.guard()?;
        let mut state = self.shared.lock();
        state.commit(updates);
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription> {
        self.guard()?;
        let mut state = self.shared.lock();
        let (tx, rx) = mpsc::unbounded_channel();
        // Current value first, then every change.
        let _ = tx.send(node_at(&state.root, path).cloned());
        let id = state.next_listener;
        state.next_listener += 1;
        state.listeners.push(Listener {
            id,
            client_id: self.client_id,
            path: path.to_string(),
            tx,
        });

        let shared = self.shared.clone();
        Ok(Subscription::new(rx, move || {
            let mut state = shared.lock();
            state.listeners.retain(|listener| listener.id != id);
        }))
    }

    async fn on_disconnect_update(&self, updates: HashMap<String, Option<Value>>) -> Result<()> {
        self.guard()?;
        let mut state = self.shared.lock();
        let payload = state
            .disconnect_payloads
            .entry(self.client_id)
            .or_default();
        payload.extend(updates);
        Ok(())
    }

    fn push_id(&self) -> String {
        let mut state = self.shared.lock();
        state.seq += 1;
        let time = state.next_server_time().timestamp_millis();
        // Fixed-width time + sequence keeps ids lexicographically ordered
        // in creation order; the random tail mirrors distributed key shape.
        format!("{:012x}{:08x}{:04x}", time, state.seq, rand::random::<u16>())
    }

    fn server_time(&self) -> DateTime<Utc> {
        self.shared.lock().next_server_time()
    }
}

/// Whether one path addresses the other or a subtree of it.
fn paths_overlap(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    long.starts_with(short) && (long.len() == short.len() || long.as_bytes()[short.len()] == b'/')
}

fn node_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('/') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn set_at(root: &mut Value, path: &str, value: Option<Value>) {
    let mut segments = path.split('/').peekable();
    let mut current = root;
    loop {
        let Some(segment) = segments.next() else {
            return;
        };
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Some(object) = current.as_object_mut() else {
            return;
        };
        if segments.peek().is_none() {
            match value {
                Some(value) => {
                    object.insert(segment.to_string(), value);
                }
                None => {
                    object.remove(segment);
                }
            }
            return;
        }
        current = object
            .entry(segment.to_string())
            .or_insert(Value::Object(Map::new()));
    }
}
