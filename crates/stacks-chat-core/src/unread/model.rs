//! Per-user, per-room chat index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user's bookkeeping for one room: unread counter, read marker,
/// activity stamp, mute flag.
///
/// `unread_count` is derived state kept denormalized on purpose: it is
/// maintained incrementally rather than recomputed by scanning every
/// message, and converges to the number of messages the user has not read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserChatIndex {
    #[serde(default)]
    pub room_id: String,
    /// Id of the newest message the user has read; empty until the first
    /// `mark_read`.
    #[serde(default)]
    pub last_read_message_id: String,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default = "unix_epoch", with = "chrono::serde::ts_milliseconds")]
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub is_muted: bool,
}

impl UserChatIndex {
    /// The index written when a room is created: nothing read, nothing
    /// unread.
    pub fn fresh(room_id: String, now: DateTime<Utc>) -> Self {
        Self {
            room_id,
            last_read_message_id: String::new(),
            unread_count: 0,
            last_activity: now,
            is_muted: false,
        }
    }
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_index() {
        let now = Utc::now();
        let index = UserChatIndex::fresh("admin001#s1".into(), now);
        assert_eq!(index.unread_count, 0);
        assert_eq!(index.last_read_message_id, "");
        assert!(!index.is_muted);
        assert_eq!(index.last_activity, now);
    }

    #[test]
    fn test_sparse_node_deserializes() {
        // Field-level store writes can leave a sparse index node.
        let index: UserChatIndex = serde_json::from_str(r#"{"unread_count": 3}"#).unwrap();
        assert_eq!(index.unread_count, 3);
        assert_eq!(index.last_activity, DateTime::UNIX_EPOCH);
    }
}
