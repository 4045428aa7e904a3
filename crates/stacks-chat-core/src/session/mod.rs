//! Session orchestration module.
//!
//! - `controller`: opens chats and wires the collaborators together
//! - `handle`: the live per-screen session with its pumps and timers

mod controller;
mod handle;

pub use controller::ChatSessionController;
pub use handle::ChatSession;
