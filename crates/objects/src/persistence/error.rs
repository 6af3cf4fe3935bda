//! Persistence error types for counter objects.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use std::fmt;

use thiserror::Error;

/// Errors that can occur during persistence operations.
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    /// Failed to open or connect to the datastore
    #[error("connection failed: {reason}")]
    ConnectionFailed { reason: String },

    /// Query execution failed
    #[error("query failed: {reason}")]
    QueryFailed { reason: String },

    /// Serialization/deserialization error
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },

    /// A migration could not be applied
    #[error("migration {version} failed: {reason}")]
    MigrationFailed { version: u32, reason: String },

    /// The migration set is not strictly ascending
    #[error("migration {version} is out of order (after {previous})")]
    MigrationOutOfOrder { version: u32, previous: u32 },

    /// Counter arithmetic left the i64 range
    #[error("counter overflow at {count}")]
    Overflow { count: i64 },
}

impl PersistenceError {
    /// Create a connection failed error.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            reason: reason.into(),
        }
    }

    /// Create a query failed error.
    pub fn query_failed(reason: impl Into<String>) -> Self {
        Self::QueryFailed {
            reason: reason.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization_error(reason: impl Into<String>) -> Self {
        Self::SerializationError {
            reason: reason.into(),
        }
    }

    /// Create a migration failed error.
    pub fn migration_failed(version: u32, reason: impl Into<String>) -> Self {
        Self::MigrationFailed {
            version,
            reason: reason.into(),
        }
    }

    /// Whether opening the store again may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. })
    }
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Helper to convert SurrealDB errors to PersistenceError.
pub fn from_surrealdb_error(err: impl fmt::Display) -> PersistenceError {
    let msg = err.to_string();

    // Categorize based on error message patterns
    if msg.contains("connection") || msg.contains("Connection") || msg.contains("connect") {
        PersistenceError::connection_failed(msg)
    } else if msg.contains("serializ") || msg.contains("deserializ") {
        PersistenceError::serialization_error(msg)
    } else {
        PersistenceError::query_failed(msg)
    }
}
