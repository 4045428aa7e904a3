//! Chat room domain model.
//!
//! A room is the persistent two-party container for a conversation's
//! messages and metadata. Rooms are created lazily on first chat session
//! start and never hard-deleted; `is_active` can be toggled but the room
//! persists for history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::{ChatUser, ParticipantRole};

/// One side of a two-party room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub role: ParticipantRole,
    pub display_name: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn from_user(user: &ChatUser, joined_at: DateTime<Utc>) -> Self {
        Self {
            role: user.role,
            display_name: user.display_name.clone(),
            avatar_ref: user.avatar_ref.clone(),
            joined_at,
        }
    }
}

/// Denormalized snapshot of a room's newest message, kept consistent by
/// the message log for list-preview surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub message_id: String,
    pub text: String,
    pub sender_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// The persistent two-party chat container.
///
/// Invariant: exactly two participants, and `room_id` is a pure function of
/// the sorted participant-id pair, so "get or create" is idempotent and
/// addressable without any lookup table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub room_id: String,
    pub participants: HashMap<String, Participant>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
}

impl ChatRoom {
    /// Builds a fresh room for the given pair.
    pub fn between(room_id: String, a: &ChatUser, b: &ChatUser, now: DateTime<Utc>) -> Self {
        let mut participants = HashMap::new();
        participants.insert(a.user_id.clone(), Participant::from_user(a, now));
        participants.insert(b.user_id.clone(), Participant::from_user(b, now));
        Self {
            room_id,
            participants,
            created_at: now,
            updated_at: now,
            is_active: true,
            last_message: None,
        }
    }

    /// The participant ids, in no particular order.
    pub fn participant_ids(&self) -> Vec<String> {
        self.participants.keys().cloned().collect()
    }

    /// The participant opposite `user_id`, if any.
    pub fn peer_of(&self, user_id: &str) -> Option<(&String, &Participant)> {
        self.participants.iter().find(|(id, _)| id.as_str() != user_id)
    }
}
