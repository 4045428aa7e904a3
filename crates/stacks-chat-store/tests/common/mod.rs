#![allow(dead_code)]

use std::time::Duration;

use stacks_chat_core::user::{ChatUser, ParticipantRole};

pub fn init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn student() -> ChatUser {
    ChatUser::new("s1", "An Nguyen", ParticipantRole::Student)
}

pub fn librarian() -> ChatUser {
    ChatUser::new("admin001", "Front Desk", ParticipantRole::Librarian)
}

/// Lets spawned pump tasks run under the paused test clock.
pub async fn settle() {
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
