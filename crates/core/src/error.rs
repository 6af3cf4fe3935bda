//! Core error types for Tally.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use thiserror::Error;

/// Core error type shared by every Tally crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The counter key cannot be used to address an actor.
    #[error("invalid counter key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// A wire message could not be encoded or decoded.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl Error {
    /// Create an invalid key error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }
}

/// The standard Result type for Tally operations.
pub type Result<T> = std::result::Result<T, Error>;
