//! Resolved user identity consumed by the chat core.
//!
//! Authentication happens outside this crate; callers hand the core an
//! already-resolved [`ChatUser`] for the local session.

use serde::{Deserialize, Serialize};

/// Which side of a student-librarian conversation a participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    /// The non-privileged side. Students open chats with librarians.
    Student,
    /// The privileged side. Librarians answer in rooms that already exist.
    Librarian,
}

impl ParticipantRole {
    /// Whether this role is allowed to bring a new room into existence.
    pub fn may_initiate(&self) -> bool {
        matches!(self, Self::Student)
    }
}

/// A resolved user identity, as provided by the app's auth/session layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatUser {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
    pub role: ParticipantRole,
}

impl ChatUser {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        role: ParticipantRole,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            avatar_ref: None,
            role,
        }
    }

    /// Sets the avatar reference (builder style).
    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_students_initiate() {
        assert!(ParticipantRole::Student.may_initiate());
        assert!(!ParticipantRole::Librarian.may_initiate());
    }
}
