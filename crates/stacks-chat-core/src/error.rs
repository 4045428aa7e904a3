//! Error types for the chat core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the chat core.
///
/// This provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait. Layers below the session
/// controller only ever return these variants; translating them into
/// user-visible feedback is the controller's job alone.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ChatError {
    /// The local user's role is not permitted to perform the operation.
    /// Fatal to the operation, never retried.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// An empty or whitespace-only message was rejected before reaching
    /// the store.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Transient connectivity failure on a store call. Writes are
    /// fire-and-retry-later, reads fall back to the last known value.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Creates an Unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Creates an InvalidMessage error
    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidMessage(message.into())
    }

    /// Creates a StoreUnavailable error
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is an Unauthorized error
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Check if this is a StoreUnavailable error
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A type alias for `Result<T, ChatError>`.
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_helpers() {
        assert!(ChatError::unauthorized("librarians cannot initiate").is_unauthorized());
        assert!(ChatError::store_unavailable("offline").is_store_unavailable());
        assert!(ChatError::not_found("ChatRoom", "a#b").is_not_found());
    }

    #[test]
    fn test_serde_error_converts() {
        let err = serde_json::from_str::<u32>("not-a-number").unwrap_err();
        let converted: ChatError = err.into();
        assert!(matches!(converted, ChatError::Serialization(_)));
    }
}
