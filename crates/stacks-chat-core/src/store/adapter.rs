//! The realtime store boundary.
//!
//! Everything the chat core persists goes through [`StoreAdapter`]. The
//! trait abstracts a realtime key-path store: last-writer-wins writes at
//! path granularity, atomic multi-path commits, live change subscriptions,
//! and on-disconnect hooks the store applies when a client vanishes.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Abstract client connection to the realtime store.
///
/// One adapter instance represents one client connection (one device).
/// Any method may fail with [`ChatError::StoreUnavailable`] while the
/// connection is down; callers treat writes as fire-and-retry-later and
/// reads as possibly stale.
///
/// [`ChatError::StoreUnavailable`]: crate::error::ChatError::StoreUnavailable
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Reads the value at `path` once.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))`: a value exists at the path
    /// - `Ok(None)`: the path is absent
    async fn read_once(&self, path: &str) -> Result<Option<Value>>;

    /// Writes `value` at `path`, replacing whatever subtree was there.
    /// Last-writer-wins at path granularity.
    async fn write(&self, path: &str, value: Value) -> Result<()>;

    /// Applies every entry in `updates` in a single commit, or none of them.
    ///
    /// A `None` value deletes the path. Used whenever two or more keys must
    /// change in lockstep (message append plus room summary, read-marking
    /// plus counter reset).
    async fn atomic_update(&self, updates: HashMap<String, Option<Value>>) -> Result<()>;

    /// Subscribes to value changes at (or under) `path`.
    ///
    /// The returned [`Subscription`] delivers the current value immediately,
    /// then a fresh snapshot after every subsequent change. Dropping or
    /// closing it releases the server-side listener.
    async fn subscribe(&self, path: &str) -> Result<Subscription>;

    /// Registers a payload the store applies exactly once if this client's
    /// connection drops before it is cancelled. A `None` value deletes the
    /// path when the payload fires.
    async fn on_disconnect_update(&self, updates: HashMap<String, Option<Value>>) -> Result<()>;

    /// Returns a new store-assigned key: strictly increasing in creation
    /// order and collision-free across concurrent writers.
    fn push_id(&self) -> String;

    /// Returns the store-assigned server time. Client clocks are never used
    /// for ordering.
    fn server_time(&self) -> DateTime<Utc>;
}

/// A live stream of value snapshots for one subscribed path.
///
/// Store change callbacks are mapped onto a channel: the store side pushes
/// snapshots, the consumer awaits [`recv`](Subscription::recv). Dropping the
/// subscription (or calling [`close`](Subscription::close)) detaches the
/// listener; no further snapshots are delivered after that.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<Option<Value>>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Builds a subscription from a snapshot channel and an unsubscribe hook.
    ///
    /// Backends call this; consumers only ever receive one.
    pub fn new(
        receiver: mpsc::UnboundedReceiver<Option<Value>>,
        unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Waits for the next snapshot.
    ///
    /// Returns `None` once the subscription is closed (by either side);
    /// otherwise the inner value is the current value at the path, `None`
    /// meaning the path is absent.
    pub async fn recv(&mut self) -> Option<Option<Value>> {
        self.receiver.recv().await
    }

    /// Detaches the listener and stops further deliveries.
    ///
    /// Idempotent; also invoked on drop.
    pub fn close(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
        self.receiver.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}
