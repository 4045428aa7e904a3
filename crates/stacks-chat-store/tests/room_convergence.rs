//! Concurrent room creation from both participants' devices converges on
//! one room.

mod common;

use std::sync::Arc;

use stacks_chat_core::room::{ChatRoom, ChatRoomManager};
use stacks_chat_core::store::path;
use stacks_chat_core::unread::UserChatIndex;
use stacks_chat_store::MemoryStore;

#[tokio::test]
async fn test_concurrent_ensure_room_converges() {
    common::init();
    let store = MemoryStore::new();

    let on_student_device = ChatRoomManager::new(Arc::new(store.client()));
    let on_librarian_device = ChatRoomManager::new(Arc::new(store.client()));

    let student = common::student();
    let librarian = common::librarian();
    let (from_student, from_librarian) = tokio::join!(
        on_student_device.ensure_room(&student, &librarian),
        on_librarian_device.ensure_room(&librarian, &student),
    );
    let from_student = from_student.unwrap();
    let from_librarian = from_librarian.unwrap();

    assert_eq!(from_student.room_id, from_librarian.room_id);
    assert_eq!(from_student.participants.len(), 2);
    assert_eq!(from_librarian.participants.len(), 2);

    // The store holds exactly one room record with both participants and
    // both pristine indexes.
    let stored: ChatRoom =
        serde_json::from_value(store.value_at(&path::room(&from_student.room_id)).unwrap())
            .unwrap();
    assert_eq!(stored.participants.len(), 2);
    assert!(stored.participants.contains_key("s1"));
    assert!(stored.participants.contains_key("admin001"));

    for user in ["s1", "admin001"] {
        let index: UserChatIndex = serde_json::from_value(
            store
                .value_at(&path::user_chat(user, &from_student.room_id))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(index.unread_count, 0);
        assert_eq!(index.last_read_message_id, "");
    }
}

#[tokio::test]
async fn test_room_id_is_independent_of_device_order() {
    common::init();
    assert_eq!(
        ChatRoomManager::room_id_for("s1", "admin001"),
        ChatRoomManager::room_id_for("admin001", "s1"),
    );
}
