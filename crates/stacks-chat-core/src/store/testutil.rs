//! In-process mock store for unit tests.
//!
//! Single-client stand-in for a realtime backend: one JSON tree, live
//! subscriptions, a recorded operation log for asserting call order, and
//! switches for outage and connection-drop simulation. The full
//! multi-client backend lives in the infrastructure crate; this mock only
//! covers what module-level tests need.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use super::{StoreAdapter, Subscription};
use crate::error::{ChatError, Result};

pub(crate) struct MockStore {
    state: Mutex<MockState>,
}

struct MockState {
    root: Value,
    subscribers: Vec<(u64, String, mpsc::UnboundedSender<Option<Value>>)>,
    next_subscriber: u64,
    disconnect_updates: Vec<(String, Option<Value>)>,
    ops: Vec<String>,
    seq: u64,
    last_ms: i64,
    available: bool,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                root: Value::Object(Map::new()),
                subscribers: Vec::new(),
                next_subscriber: 0,
                disconnect_updates: Vec::new(),
                ops: Vec::new(),
                seq: 0,
                last_ms: 0,
                available: true,
            }),
        }
    }

    /// Test helper: direct write with notifications, bypassing availability.
    pub fn put(&self, path: &str, value: Value) {
        let mut state = self.state.lock().unwrap();
        let mut updates = HashMap::new();
        updates.insert(path.to_string(), Some(value));
        state.commit(updates);
    }

    /// Test helper: current value at a path.
    pub fn get(&self, path: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        node_at(&state.root, path).cloned()
    }

    /// Recorded operation log, e.g. `write:presence/s1`.
    pub fn ops(&self) -> Vec<String> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn set_available(&self, available: bool) {
        self.state.lock().unwrap().available = available;
    }

    /// Applies the registered on-disconnect payload exactly once.
    pub fn fire_disconnect(&self) {
        let mut state = self.state.lock().unwrap();
        let payload: HashMap<String, Option<Value>> =
            state.disconnect_updates.drain(..).collect();
        if !payload.is_empty() {
            state.commit(payload);
        }
    }

    fn guard_available(state: &MockState) -> Result<()> {
        if state.available {
            Ok(())
        } else {
            Err(ChatError::store_unavailable("mock store offline"))
        }
    }
}

impl MockState {
    fn commit(&mut self, updates: HashMap<String, Option<Value>>) {
        for (path, value) in &updates {
            set_at(&mut self.root, path, value.clone());
        }
        let changed: Vec<&String> = updates.keys().collect();
        for (_, sub_path, tx) in &self.subscribers {
            if changed.iter().any(|p| paths_related(sub_path, p)) {
                let _ = tx.send(node_at(&self.root, sub_path).cloned());
            }
        }
    }
}

#[async_trait]
impl StoreAdapter for MockStore {
    async fn read_once(&self, path: &str) -> Result<Option<Value>> {
        let state = self.state.lock().unwrap();
        Self::guard_available(&state)?;
        Ok(node_at(&state.root, path).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::guard_available(&state)?;
        state.ops.push(format!("write:{path}"));
        let mut updates = HashMap::new();
        updates.insert(path.to_string(), Some(value));
        state.commit(updates);
        Ok(())
    }

    async fn atomic_update(&self, updates: HashMap<String, Option<Value>>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::guard_available(&state)?;
        let mut paths: Vec<&String> = updates.keys().collect();
        paths.sort();
        for path in paths {
            state.ops.push(format!("update:{path}"));
        }
        state.commit(updates);
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription> {
        let mut state = self.state.lock().unwrap();
        Self::guard_available(&state)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(node_at(&state.root, path).cloned());
        let id = state.next_subscriber;
        state.next_subscriber += 1;
        state.subscribers.push((id, path.to_string(), tx));
        state.ops.push(format!("subscribe:{path}"));
        Ok(Subscription::new(rx, || {}))
    }

    async fn on_disconnect_update(&self, updates: HashMap<String, Option<Value>>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::guard_available(&state)?;
        for (path, value) in updates {
            state.ops.push(format!("on_disconnect:{path}"));
            state.disconnect_updates.push((path, value));
        }
        Ok(())
    }

    fn push_id(&self) -> String {
        let mut state = self.state.lock().unwrap();
        state.seq += 1;
        format!("{:012x}{:06x}", state.last_ms.max(0), state.seq)
    }

    fn server_time(&self) -> DateTime<Utc> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now().timestamp_millis();
        state.last_ms = if now > state.last_ms { now } else { state.last_ms + 1 };
        DateTime::from_timestamp_millis(state.last_ms).unwrap()
    }
}

/// Two paths are related when one addresses the other or a subtree of it.
fn paths_related(a: &str, b: &str) -> bool {
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
    let segments: Vec<&str> = path.split('/').collect();
    let mut current = root;
    for segment in &segments[..segments.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = current
            .as_object_mut()
            .unwrap()
            .entry(segment.to_string())
            .or_insert(Value::Null);
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    let object = current.as_object_mut().unwrap();
    let last = segments[segments.len() - 1];
    match value {
        Some(value) => {
            object.insert(last.to_string(), value);
        }
        None => {
            object.remove(last);
        }
    }
}
