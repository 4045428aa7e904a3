//! Message domain model.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of message kinds; anything else rides in `metadata`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    System,
}

/// One message in a room.
///
/// Created once by the message log; after that only the `read_by` map ever
/// changes. Messages are never edited or deleted. Within a room messages
/// are totally ordered by `(timestamp, message_id)`: the timestamp is
/// store-assigned server time and the id is the store's push key, so every
/// subscriber observes the same order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub sender_id: String,
    pub text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub kind: MessageKind,
    /// Per-participant read receipts. The sender's own flag is true from
    /// creation; everyone else starts false.
    #[serde(default)]
    pub read_by: HashMap<String, bool>,
    /// Opaque forward-compatible extension bag.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl Message {
    /// Whether `user_id` has seen this message.
    pub fn is_read_by(&self, user_id: &str) -> bool {
        self.read_by.get(user_id).copied().unwrap_or(false)
    }

    /// Total-order key: server timestamp, ties broken by insertion key.
    pub fn order_key(&self) -> (i64, &str) {
        (self.timestamp.timestamp_millis(), self.message_id.as_str())
    }
}
