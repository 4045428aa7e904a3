//! Key-path layout of the chat tree.
//!
//! ```text
//! rooms/{room_id}                          ChatRoom
//! room-messages/{room_id}/{message_id}     Message
//! presence/{user_id}                       PresenceRecord
//! user-chats/{user_id}/{room_id}           UserChatIndex
//! ```
//!
//! Every path the core touches is built here so the layout has a single
//! source of truth.

/// Path of a room's metadata record.
pub fn room(room_id: &str) -> String {
    format!("rooms/{room_id}")
}

/// Path of a single field inside a room record.
pub fn room_field(room_id: &str, field: &str) -> String {
    format!("rooms/{room_id}/{field}")
}

/// Path of a room's message collection.
pub fn room_messages(room_id: &str) -> String {
    format!("room-messages/{room_id}")
}

/// Path of one message in a room.
pub fn message(room_id: &str, message_id: &str) -> String {
    format!("room-messages/{room_id}/{message_id}")
}

/// Path of one user's read flag on one message.
pub fn message_read_flag(room_id: &str, message_id: &str, user_id: &str) -> String {
    format!("room-messages/{room_id}/{message_id}/read_by/{user_id}")
}

/// Path of a user's presence record. Presence is per user, not per room.
pub fn presence(user_id: &str) -> String {
    format!("presence/{user_id}")
}

/// Path of a user's whole chat-index collection.
pub fn user_chats(user_id: &str) -> String {
    format!("user-chats/{user_id}")
}

/// Path of one user's index record for one room.
pub fn user_chat(user_id: &str, room_id: &str) -> String {
    format!("user-chats/{user_id}/{room_id}")
}

/// Path of a single field inside a user's index record.
pub fn user_chat_field(user_id: &str, room_id: &str, field: &str) -> String {
    format!("user-chats/{user_id}/{room_id}/{field}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_compose() {
        assert_eq!(room("a#b"), "rooms/a#b");
        assert_eq!(message("a#b", "m1"), "room-messages/a#b/m1");
        assert_eq!(
            message_read_flag("a#b", "m1", "u1"),
            "room-messages/a#b/m1/read_by/u1"
        );
        assert_eq!(user_chat_field("u1", "a#b", "unread_count"), "user-chats/u1/a#b/unread_count");
    }
}
