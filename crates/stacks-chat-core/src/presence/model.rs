//! Presence domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's ephemeral online/typing state. Per user, not per room.
///
/// Exactly one writer exists for each record: the user's own active
/// session. Everyone else only reads it. When no record exists at the
/// presence path yet, readers see [`PresenceRecord::default`] (offline,
/// never seen, not typing) so consumers never null-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    #[serde(default)]
    pub online: bool,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub typing: bool,
}

impl PresenceRecord {
    /// The record written on session start and on graceful sign-off.
    pub fn at(online: bool, seen: DateTime<Utc>) -> Self {
        Self {
            online,
            last_seen: Some(seen),
            typing: false,
        }
    }
}

impl Default for PresenceRecord {
    fn default() -> Self {
        Self {
            online: false,
            last_seen: None,
            typing: false,
        }
    }
}
