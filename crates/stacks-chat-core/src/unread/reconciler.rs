//! Read-receipt and unread-count reconciliation.
//!
//! Counters here are convergent, not linearizable. The store offers no
//! cross-client locks, so the increment path reads a recipient's current
//! counter and writes counter+1. Under a truly concurrent `mark_read`
//! interleaving the increment is at-least-once, and the next read or
//! append cycle corrects any drift. The quiescent case (one sender, idle
//! recipient) is exact.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};

use super::model::UserChatIndex;
use crate::error::Result;
use crate::message::Message;
use crate::store::{StoreAdapter, Subscription, path};

/// Maintains per-user unread counters and last-read markers.
#[derive(Clone)]
pub struct UnreadReconciler {
    store: Arc<dyn StoreAdapter>,
}

impl UnreadReconciler {
    pub fn new(store: Arc<dyn StoreAdapter>) -> Self {
        Self { store }
    }

    /// Reconciles counters after a message append.
    ///
    /// For each recipient (participant other than the sender): read the
    /// current counter, then commit counter+1 and a fresh activity stamp
    /// together. The sender only gets the activity stamp.
    pub async fn note_appended(
        &self,
        room_id: &str,
        sender_id: &str,
        participant_ids: &[String],
    ) -> Result<()> {
        let now = self.store.server_time();
        let now_ms = json!(now.timestamp_millis());

        for user_id in participant_ids {
            if user_id == sender_id {
                continue;
            }
            let index_path = path::user_chat(user_id, room_id);
            match self.store.read_once(&index_path).await? {
                Some(value) => {
                    let current: UserChatIndex = serde_json::from_value(value)?;
                    let mut updates = HashMap::new();
                    updates.insert(
                        path::user_chat_field(user_id, room_id, "unread_count"),
                        Some(json!(current.unread_count + 1)),
                    );
                    updates.insert(
                        path::user_chat_field(user_id, room_id, "last_activity"),
                        Some(now_ms.clone()),
                    );
                    self.store.atomic_update(updates).await?;
                    tracing::debug!(
                        room_id,
                        user_id,
                        unread = current.unread_count + 1,
                        "unread incremented"
                    );
                }
                None => {
                    // Index missing (room predates index bookkeeping);
                    // rebuild it with this message as the only unread one.
                    let mut index = UserChatIndex::fresh(room_id.to_string(), now);
                    index.unread_count = 1;
                    self.store
                        .write(&index_path, serde_json::to_value(&index)?)
                        .await?;
                }
            }
        }

        self.store
            .write(
                &path::user_chat_field(sender_id, room_id, "last_activity"),
                now_ms,
            )
            .await
    }

    /// Marks every message in the room read for `user_id`.
    ///
    /// One atomic commit flips all missing `read_by` flags, advances
    /// `last_read_message_id` to the newest message, zeroes the counter and
    /// stamps activity. Calling it again with nothing new is a no-op in
    /// effect: no flags are left to flip and the same values are rewritten.
    ///
    /// A message appended between the read and the commit stays unread
    /// until the next cycle; accepted, convergent behavior.
    pub async fn mark_read(&self, room_id: &str, user_id: &str) -> Result<()> {
        let messages = self.read_messages(room_id).await?;
        let now = self.store.server_time();

        let mut updates = HashMap::new();
        let mut flipped = 0u32;
        for message in &messages {
            if !message.is_read_by(user_id) {
                updates.insert(
                    path::message_read_flag(room_id, &message.message_id, user_id),
                    Some(json!(true)),
                );
                flipped += 1;
            }
        }

        updates.insert(
            path::user_chat_field(user_id, room_id, "unread_count"),
            Some(json!(0)),
        );
        if let Some(newest) = messages.last() {
            updates.insert(
                path::user_chat_field(user_id, room_id, "last_read_message_id"),
                Some(json!(newest.message_id)),
            );
        }
        updates.insert(
            path::user_chat_field(user_id, room_id, "last_activity"),
            Some(json!(now.timestamp_millis())),
        );
        self.store.atomic_update(updates).await?;

        if flipped > 0 {
            tracing::debug!(room_id, user_id, flipped, "messages marked read");
        }
        Ok(())
    }

    /// One user's index for one room, if it exists.
    pub async fn index(&self, user_id: &str, room_id: &str) -> Result<Option<UserChatIndex>> {
        match self
            .store
            .read_once(&path::user_chat(user_id, room_id))
            .await?
        {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// All of a user's chat indexes, most recently active first.
    pub async fn indexes_for(&self, user_id: &str) -> Result<Vec<UserChatIndex>> {
        let value = self.store.read_once(&path::user_chats(user_id)).await?;
        let Some(Value::Object(children)) = value else {
            return Ok(Vec::new());
        };
        let mut indexes: Vec<UserChatIndex> = children
            .into_iter()
            .filter_map(|(key, child)| match serde_json::from_value(child) {
                Ok(index) => Some(index),
                Err(err) => {
                    tracing::warn!(%key, %err, "skipping malformed chat index");
                    None
                }
            })
            .collect();
        indexes.sort_by_key(|index| std::cmp::Reverse(index.last_activity));
        Ok(indexes)
    }

    /// Mutes or unmutes a room for one user.
    pub async fn set_muted(&self, user_id: &str, room_id: &str, is_muted: bool) -> Result<()> {
        self.store
            .write(
                &path::user_chat_field(user_id, room_id, "is_muted"),
                json!(is_muted),
            )
            .await
    }

    /// Subscribes to one user's unread counter for one room, for badge
    /// surfaces. An absent counter reads as zero.
    pub async fn subscribe_unread(&self, user_id: &str, room_id: &str) -> Result<UnreadStream> {
        let inner = self
            .store
            .subscribe(&path::user_chat_field(user_id, room_id, "unread_count"))
            .await?;
        Ok(UnreadStream { inner })
    }

    async fn read_messages(&self, room_id: &str) -> Result<Vec<Message>> {
        let value = self.store.read_once(&path::room_messages(room_id)).await?;
        let Some(Value::Object(children)) = value else {
            return Ok(Vec::new());
        };
        let mut messages: Vec<Message> = children
            .into_iter()
            .filter_map(|(_, child)| serde_json::from_value(child).ok())
            .collect();
        messages.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Ok(messages)
    }
}

/// Live unread-count values for one user and room.
pub struct UnreadStream {
    inner: Subscription,
}

impl UnreadStream {
    /// Waits for the next counter value. Returns `None` once closed.
    pub async fn recv(&mut self) -> Option<u32> {
        let value = self.inner.recv().await?;
        Some(
            value
                .as_ref()
                .and_then(Value::as_u64)
                .map(|n| n as u32)
                .unwrap_or(0),
        )
    }

    /// Detaches the underlying store listener.
    pub fn close(&mut self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageKind, MessageLog};
    use crate::room::ChatRoomManager;
    use crate::store::testutil::MockStore;
    use crate::user::{ChatUser, ParticipantRole};

    struct Fixture {
        store: Arc<MockStore>,
        log: MessageLog,
        reconciler: UnreadReconciler,
        room_id: String,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MockStore::new());
        let manager = ChatRoomManager::new(store.clone());
        let student = ChatUser::new("s1", "An Nguyen", ParticipantRole::Student);
        let librarian = ChatUser::new("admin001", "Front Desk", ParticipantRole::Librarian);
        let room_id = manager.ensure_room(&student, &librarian).await.unwrap().room_id;
        Fixture {
            log: MessageLog::new(store.clone()),
            reconciler: UnreadReconciler::new(store.clone()),
            store,
            room_id,
        }
    }

    async fn send(f: &Fixture, text: &str) {
        let message = f
            .log
            .append(&f.room_id, "s1", text, MessageKind::Text, HashMap::new())
            .await
            .unwrap();
        let participants: Vec<String> = message.read_by.keys().cloned().collect();
        f.reconciler
            .note_appended(&f.room_id, "s1", &participants)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_quiescent_unread_count_is_exact() {
        let f = fixture().await;
        for i in 0..5 {
            send(&f, &format!("message {i}")).await;
        }
        let index = f.reconciler.index("admin001", &f.room_id).await.unwrap().unwrap();
        assert_eq!(index.unread_count, 5);

        // The sender's own counter never moves.
        let sender = f.reconciler.index("s1", &f.room_id).await.unwrap().unwrap();
        assert_eq!(sender.unread_count, 0);
    }

    #[tokio::test]
    async fn test_mark_read_flips_flags_and_zeroes_counter() {
        let f = fixture().await;
        send(&f, "one").await;
        send(&f, "two").await;

        f.reconciler.mark_read(&f.room_id, "admin001").await.unwrap();

        let index = f.reconciler.index("admin001", &f.room_id).await.unwrap().unwrap();
        assert_eq!(index.unread_count, 0);

        let messages = f.log.read_all(&f.room_id).await.unwrap();
        assert!(messages.iter().all(|m| m.is_read_by("admin001")));
        assert_eq!(index.last_read_message_id, messages.last().unwrap().message_id);
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent() {
        let f = fixture().await;
        send(&f, "only one").await;

        f.reconciler.mark_read(&f.room_id, "admin001").await.unwrap();
        let first = f.reconciler.index("admin001", &f.room_id).await.unwrap().unwrap();

        f.reconciler.mark_read(&f.room_id, "admin001").await.unwrap();
        let second = f.reconciler.index("admin001", &f.room_id).await.unwrap().unwrap();

        assert_eq!(second.unread_count, 0);
        assert_eq!(second.last_read_message_id, first.last_read_message_id);
    }

    #[tokio::test]
    async fn test_mark_read_on_empty_room_keeps_marker() {
        let f = fixture().await;
        f.reconciler.mark_read(&f.room_id, "admin001").await.unwrap();
        let index = f.reconciler.index("admin001", &f.room_id).await.unwrap().unwrap();
        assert_eq!(index.unread_count, 0);
        assert_eq!(index.last_read_message_id, "");
    }

    #[tokio::test]
    async fn test_unread_stream_tracks_counter() {
        let f = fixture().await;
        let mut stream = f
            .reconciler
            .subscribe_unread("admin001", &f.room_id)
            .await
            .unwrap();
        assert_eq!(stream.recv().await, Some(0));

        send(&f, "ping").await;
        assert_eq!(stream.recv().await, Some(1));

        f.reconciler.mark_read(&f.room_id, "admin001").await.unwrap();
        assert_eq!(stream.recv().await, Some(0));
    }

    #[tokio::test]
    async fn test_set_muted_only_touches_flag() {
        let f = fixture().await;
        send(&f, "ping").await;

        f.reconciler.set_muted("admin001", &f.room_id, true).await.unwrap();
        let index = f.reconciler.index("admin001", &f.room_id).await.unwrap().unwrap();
        assert!(index.is_muted);
        assert_eq!(index.unread_count, 1);
    }

    #[tokio::test]
    async fn test_indexes_for_sorts_by_recent_activity() {
        let store = Arc::new(MockStore::new());
        let manager = ChatRoomManager::new(store.clone());
        let reconciler = UnreadReconciler::new(store.clone());
        let log = MessageLog::new(store.clone());

        let student = ChatUser::new("s1", "An Nguyen", ParticipantRole::Student);
        let desk = ChatUser::new("admin001", "Front Desk", ParticipantRole::Librarian);
        let archive = ChatUser::new("admin002", "Archive", ParticipantRole::Librarian);

        let first = manager.ensure_room(&student, &desk).await.unwrap().room_id;
        let second = manager.ensure_room(&student, &archive).await.unwrap().room_id;

        // Activity lands in `first` last, so it sorts to the front.
        let message = log
            .append(&second, "admin002", "ready", MessageKind::Text, HashMap::new())
            .await
            .unwrap();
        reconciler
            .note_appended(&second, "admin002", &message.read_by.keys().cloned().collect::<Vec<_>>())
            .await
            .unwrap();
        let message = log
            .append(&first, "admin001", "overdue", MessageKind::Text, HashMap::new())
            .await
            .unwrap();
        reconciler
            .note_appended(&first, "admin001", &message.read_by.keys().cloned().collect::<Vec<_>>())
            .await
            .unwrap();

        let indexes = reconciler.indexes_for("s1").await.unwrap();
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].room_id, first);
        assert_eq!(indexes[1].room_id, second);
    }
}
