//! Presence domain module.
//!
//! - `model`: the per-user ephemeral presence record
//! - `tracker`: lifecycle publishing and peer observation

mod model;
mod tracker;

pub use model::PresenceRecord;
pub use tracker::{PresenceStream, PresenceTracker};
