//! Presence lifecycle over the store.
//!
//! State machine per session: `offline → online → (typing ⇄ not-typing)
//! → offline`. The tracker owns no timers; typing debounce policy belongs
//! to the session controller. What it does own is the self-heal guarantee:
//! `go_online` registers an on-disconnect payload so a crashed client is
//! flipped offline by the store itself, with no heartbeat polling.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use super::model::PresenceRecord;
use crate::error::Result;
use crate::store::{StoreAdapter, Subscription, path};

/// Publishes the local user's presence and observes peers'.
#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn StoreAdapter>,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn StoreAdapter>) -> Self {
        Self { store }
    }

    /// Marks `user_id` online and arms the offline self-heal.
    ///
    /// The disconnect payload is registered after the online write, on every
    /// session start: a hard crash must still flip the user offline, and the
    /// registration is the only mechanism that does so.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if either store call fails; the session
    /// is not considered online in that case.
    pub async fn go_online(&self, user_id: &str) -> Result<()> {
        let now = self.store.server_time();
        let presence_path = path::presence(user_id);

        let online = PresenceRecord::at(true, now);
        self.store
            .write(&presence_path, serde_json::to_value(&online)?)
            .await?;

        let offline = PresenceRecord::at(false, now);
        let mut on_drop = HashMap::new();
        on_drop.insert(presence_path, Some(serde_json::to_value(&offline)?));
        self.store.on_disconnect_update(on_drop).await?;

        tracing::debug!(user_id, "presence online");
        Ok(())
    }

    /// Graceful sign-off.
    ///
    /// The pending disconnect payload is left registered; re-applying the
    /// same offline values later is harmless.
    pub async fn go_offline(&self, user_id: &str) -> Result<()> {
        let now = self.store.server_time();
        let offline = PresenceRecord::at(false, now);
        self.store
            .write(&path::presence(user_id), serde_json::to_value(&offline)?)
            .await?;
        tracing::debug!(user_id, "presence offline");
        Ok(())
    }

    /// Sets the typing flag directly. Debounce/timeout policy is the
    /// caller's responsibility.
    pub async fn set_typing(&self, user_id: &str, typing: bool) -> Result<()> {
        let typing_path = format!("{}/typing", path::presence(user_id));
        self.store.write(&typing_path, json!(typing)).await
    }

    /// Subscribes to a peer's presence.
    ///
    /// The stream delivers the peer's current record immediately and then on
    /// every change; an absent record maps to the default offline value.
    pub async fn subscribe(&self, peer_id: &str) -> Result<PresenceStream> {
        let inner = self.store.subscribe(&path::presence(peer_id)).await?;
        Ok(PresenceStream { inner })
    }
}

/// Live presence values for one peer.
pub struct PresenceStream {
    inner: Subscription,
}

impl PresenceStream {
    /// Waits for the next presence value. Returns `None` once the
    /// subscription is closed.
    pub async fn recv(&mut self) -> Option<PresenceRecord> {
        loop {
            match self.inner.recv().await? {
                None => return Some(PresenceRecord::default()),
                Some(value) => match serde_json::from_value(value) {
                    Ok(record) => return Some(record),
                    Err(err) => {
                        tracing::warn!(%err, "skipping malformed presence record");
                    }
                },
            }
        }
    }

    /// Detaches the underlying store listener.
    pub fn close(&mut self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testutil::MockStore;
    use chrono::DateTime;

    #[tokio::test]
    async fn test_go_online_writes_record_then_registers_disconnect() {
        let store = Arc::new(MockStore::new());
        let tracker = PresenceTracker::new(store.clone());

        tracker.go_online("s1").await.unwrap();

        let record: PresenceRecord =
            serde_json::from_value(store.get("presence/s1").unwrap()).unwrap();
        assert!(record.online);
        assert!(!record.typing);
        assert!(record.last_seen.is_some());

        // The disconnect payload must be armed and must flip the user offline.
        let ops = store.ops();
        let write_pos = ops.iter().position(|op| op == "write:presence/s1").unwrap();
        let hook_pos = ops
            .iter()
            .position(|op| op == "on_disconnect:presence/s1")
            .unwrap();
        assert!(write_pos < hook_pos);

        store.fire_disconnect();
        let healed: PresenceRecord =
            serde_json::from_value(store.get("presence/s1").unwrap()).unwrap();
        assert!(!healed.online);
    }

    #[tokio::test]
    async fn test_set_typing_touches_only_the_flag() {
        let store = Arc::new(MockStore::new());
        let tracker = PresenceTracker::new(store.clone());

        tracker.go_online("s1").await.unwrap();
        let before: PresenceRecord =
            serde_json::from_value(store.get("presence/s1").unwrap()).unwrap();

        tracker.set_typing("s1", true).await.unwrap();
        let after: PresenceRecord =
            serde_json::from_value(store.get("presence/s1").unwrap()).unwrap();
        assert!(after.typing);
        assert_eq!(after.online, before.online);
        assert_eq!(after.last_seen, before.last_seen);
    }

    #[tokio::test]
    async fn test_subscribe_defaults_absent_record_to_offline() {
        let store = Arc::new(MockStore::new());
        let tracker = PresenceTracker::new(store.clone());

        let mut stream = tracker.subscribe("nobody").await.unwrap();
        assert_eq!(stream.recv().await, Some(PresenceRecord::default()));
    }

    #[tokio::test]
    async fn test_subscribe_delivers_changes() {
        let store = Arc::new(MockStore::new());
        let tracker = PresenceTracker::new(store.clone());

        let mut stream = tracker.subscribe("admin001").await.unwrap();
        assert_eq!(stream.recv().await, Some(PresenceRecord::default()));

        let seen = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        store.put(
            "presence/admin001",
            serde_json::to_value(PresenceRecord::at(true, seen)).unwrap(),
        );
        assert_eq!(stream.recv().await, Some(PresenceRecord::at(true, seen)));
    }
}
