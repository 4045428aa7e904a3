//! Realtime chat core for the Stacks library app.
//!
//! Student-to-librarian messaging over a shared realtime key-value store:
//! room lifecycle, message append/ordering, presence and typing state, read
//! receipts and unread-count bookkeeping. The store itself is abstracted
//! behind [`store::StoreAdapter`]; this crate never talks to any other
//! service.
//!
//! # Module Structure
//!
//! - `store`: the store-adapter boundary and key-path layout
//! - `room`: two-party room records and idempotent get-or-create
//! - `message`: the append-only ordered message log
//! - `presence`: per-user online/typing state with disconnect self-heal
//! - `unread`: read receipts and convergent unread counters
//! - `session`: the per-screen controller tying it all together
//!
//! # Usage
//!
//! ```ignore
//! use stacks_chat_core::session::ChatSessionController;
//! use stacks_chat_core::user::{ChatUser, ParticipantRole};
//!
//! let controller = ChatSessionController::new(store);
//! let me = ChatUser::new("s1", "An Nguyen", ParticipantRole::Student);
//! let desk = ChatUser::new("admin001", "Front Desk", ParticipantRole::Librarian);
//! let session = controller.open_chat(me, desk).await?;
//! session.send_message("Xin chào").await?;
//! ```

pub mod config;
pub mod error;
pub mod message;
pub mod presence;
pub mod room;
pub mod session;
pub mod store;
pub mod unread;
pub mod user;

// Re-export common types
pub use config::ChatConfig;
pub use error::{ChatError, Result};
