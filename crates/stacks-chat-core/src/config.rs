use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunable policies for a chat session.
///
/// All fields have defaults matching the production deployment; a config
/// loaded from the app shell only needs to name the values it overrides.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ChatConfig {
    /// Idle window in milliseconds after the last composer change before the
    /// typing flag is cleared.
    #[serde(default = "default_typing_idle_ms")]
    pub typing_idle_ms: u64,
    /// Sender id attached to locally-synthesized system notices.
    #[serde(default = "default_system_sender_id")]
    pub system_sender_id: String,
}

impl ChatConfig {
    /// The typing idle window as a `Duration`.
    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            typing_idle_ms: default_typing_idle_ms(),
            system_sender_id: default_system_sender_id(),
        }
    }
}

fn default_typing_idle_ms() -> u64 {
    3_000
}

fn default_system_sender_id() -> String {
    "system".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.typing_idle(), Duration::from_secs(3));
        assert_eq!(config.system_sender_id, "system");
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config: ChatConfig = serde_json::from_str(r#"{"typing_idle_ms": 500}"#).unwrap();
        assert_eq!(config.typing_idle(), Duration::from_millis(500));
        assert_eq!(config.system_sender_id, "system");
    }
}
