//! Append-only message log per room.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};

use super::model::{Message, MessageKind};
use crate::error::{ChatError, Result};
use crate::room::{ChatRoom, LastMessage};
use crate::store::{StoreAdapter, Subscription, path};

/// Appends messages and exposes the room's ordered live message list.
#[derive(Clone)]
pub struct MessageLog {
    store: Arc<dyn StoreAdapter>,
}

impl MessageLog {
    pub fn new(store: Arc<dyn StoreAdapter>) -> Self {
        Self { store }
    }

    /// Appends a message to a room.
    ///
    /// The message node, the room's `last_message` snapshot, and the room's
    /// `updated_at` commit in one atomic step, so no observer ever sees a
    /// message without its summary or vice versa. Unread counters are NOT
    /// touched here: the increment needs a read-then-write per recipient
    /// and belongs to the reconciler.
    ///
    /// # Errors
    ///
    /// - `InvalidMessage` for empty/whitespace-only text (never reaches the
    ///   store)
    /// - `NotFound` if the room does not exist
    /// - `StoreUnavailable` if the commit cannot reach the store
    pub async fn append(
        &self,
        room_id: &str,
        sender_id: &str,
        text: &str,
        kind: MessageKind,
        metadata: HashMap<String, Value>,
    ) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(ChatError::invalid_message("text is empty"));
        }

        let room: ChatRoom = match self.store.read_once(&path::room(room_id)).await? {
            Some(value) => serde_json::from_value(value)?,
            None => return Err(ChatError::not_found("ChatRoom", room_id)),
        };

        let message_id = self.store.push_id();
        let timestamp = self.store.server_time();

        let mut read_by = HashMap::new();
        for participant_id in room.participants.keys() {
            read_by.insert(participant_id.clone(), participant_id == sender_id);
        }
        read_by.insert(sender_id.to_string(), true);

        let message = Message {
            message_id: message_id.clone(),
            sender_id: sender_id.to_string(),
            text: text.to_string(),
            timestamp,
            kind,
            read_by,
            metadata,
        };
        let summary = LastMessage {
            message_id: message_id.clone(),
            text: message.text.clone(),
            sender_id: message.sender_id.clone(),
            timestamp,
        };

        let mut updates = HashMap::new();
        updates.insert(
            path::message(room_id, &message_id),
            Some(serde_json::to_value(&message)?),
        );
        updates.insert(
            path::room_field(room_id, "last_message"),
            Some(serde_json::to_value(&summary)?),
        );
        updates.insert(
            path::room_field(room_id, "updated_at"),
            Some(json!(timestamp.timestamp_millis())),
        );
        self.store.atomic_update(updates).await?;

        tracing::debug!(room_id, %message_id, sender_id, "message appended");
        Ok(message)
    }

    /// Reads the room's messages once, in total order.
    pub async fn read_all(&self, room_id: &str) -> Result<Vec<Message>> {
        let value = self.store.read_once(&path::room_messages(room_id)).await?;
        Ok(decode_collection(value))
    }

    /// Subscribes to the room's live message list.
    ///
    /// Every snapshot is sorted by `(timestamp, message_id)`; all
    /// subscribers of a room observe the same total order.
    pub async fn subscribe(&self, room_id: &str) -> Result<MessageStream> {
        let inner = self.store.subscribe(&path::room_messages(room_id)).await?;
        Ok(MessageStream { inner })
    }
}

/// Ordered message-list snapshots for one room.
pub struct MessageStream {
    inner: Subscription,
}

impl MessageStream {
    /// Waits for the next snapshot. Returns `None` once the subscription is
    /// closed.
    pub async fn recv(&mut self) -> Option<Vec<Message>> {
        let value = self.inner.recv().await?;
        Some(decode_collection(value))
    }

    /// Detaches the underlying store listener.
    pub fn close(&mut self) {
        self.inner.close();
    }
}

fn decode_collection(value: Option<Value>) -> Vec<Message> {
    let Some(Value::Object(children)) = value else {
        return Vec::new();
    };
    let mut messages: Vec<Message> = children
        .into_iter()
        .filter_map(|(key, child)| match serde_json::from_value(child) {
            Ok(message) => Some(message),
            Err(err) => {
                tracing::warn!(%key, %err, "skipping malformed message node");
                None
            }
        })
        .collect();
    messages.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::ChatRoomManager;
    use crate::store::testutil::MockStore;
    use crate::user::{ChatUser, ParticipantRole};

    async fn room_with(store: &Arc<MockStore>) -> String {
        let manager = ChatRoomManager::new(store.clone());
        let student = ChatUser::new("s1", "An Nguyen", ParticipantRole::Student);
        let librarian = ChatUser::new("admin001", "Front Desk", ParticipantRole::Librarian);
        manager.ensure_room(&student, &librarian).await.unwrap().room_id
    }

    #[tokio::test]
    async fn test_append_rejects_blank_text() {
        let store = Arc::new(MockStore::new());
        let room_id = room_with(&store).await;
        let log = MessageLog::new(store.clone());

        for text in ["", "   ", "\n\t"] {
            let err = log
                .append(&room_id, "s1", text, MessageKind::Text, HashMap::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ChatError::InvalidMessage(_)));
        }
        assert!(log.read_all(&room_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_requires_room() {
        let store = Arc::new(MockStore::new());
        let log = MessageLog::new(store.clone());
        let err = log
            .append("nowhere", "s1", "hi", MessageKind::Text, HashMap::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_append_seeds_read_by_and_updates_summary() {
        let store = Arc::new(MockStore::new());
        let room_id = room_with(&store).await;
        let log = MessageLog::new(store.clone());

        let message = log
            .append(&room_id, "s1", "Xin chào", MessageKind::Text, HashMap::new())
            .await
            .unwrap();

        assert!(message.is_read_by("s1"));
        assert!(!message.is_read_by("admin001"));
        assert_eq!(message.read_by.len(), 2);

        let room: ChatRoom =
            serde_json::from_value(store.get(&path::room(&room_id)).unwrap()).unwrap();
        let summary = room.last_message.unwrap();
        assert_eq!(summary.message_id, message.message_id);
        assert_eq!(summary.text, "Xin chào");
        assert_eq!(room.updated_at, message.timestamp);
    }

    #[tokio::test]
    async fn test_snapshots_are_totally_ordered() {
        let store = Arc::new(MockStore::new());
        let room_id = room_with(&store).await;
        let log = MessageLog::new(store.clone());

        let mut stream = log.subscribe(&room_id).await.unwrap();
        assert_eq!(stream.recv().await, Some(Vec::new()));

        for text in ["one", "two", "three"] {
            log.append(&room_id, "s1", text, MessageKind::Text, HashMap::new())
                .await
                .unwrap();
        }

        // Drain the three per-append snapshots; the last one has all three
        // messages in append order.
        let mut latest = Vec::new();
        for _ in 0..3 {
            latest = stream.recv().await.unwrap();
        }
        assert_eq!(
            latest.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(),
            vec!["one", "two", "three"],
        );
        assert_eq!(latest, log.read_all(&room_id).await.unwrap());
    }
}
