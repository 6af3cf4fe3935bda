//! Actor-specific error types.
//!
//! These are business logic errors returned in RPC replies.
//! They are NOT actor crashes - they're normal error responses.

use tally_core::CounterKey;
use thiserror::Error;

use crate::persistence::PersistenceError;

/// Errors returned to callers of counter operations.
///
/// Except for `MigrationFailed`, which aborts construction of an instance,
/// the actor keeps running after returning these.
#[derive(Debug, Clone, Error)]
pub enum CounterError {
    /// The key cannot address a counter.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The schema could not be migrated; the instance was not constructed.
    #[error("Migration failed for counter '{key}': {reason}")]
    MigrationFailed { key: String, reason: String },

    /// A read or write against the durable store failed.
    #[error("Storage failure for counter '{key}': {reason}")]
    StorageFailure { key: String, reason: String },

    /// The connection went away before it could be registered.
    #[error("Connection closed before joining counter '{key}'")]
    ConnectionClosed { key: String },

    /// The actor is not available (stopped or not started).
    #[error("Actor not available for counter '{key}'")]
    ActorUnavailable { key: String },
}

impl CounterError {
    /// Create a migration failed error.
    pub fn migration_failed(key: &CounterKey, reason: impl Into<String>) -> Self {
        Self::MigrationFailed {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a storage failure from a persistence error.
    pub fn storage_failure(key: &CounterKey, err: &PersistenceError) -> Self {
        Self::StorageFailure {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }

    /// Create a connection closed error.
    pub fn connection_closed(key: &CounterKey) -> Self {
        Self::ConnectionClosed {
            key: key.to_string(),
        }
    }

    /// Create an actor unavailable error.
    pub fn actor_unavailable(key: &CounterKey) -> Self {
        Self::ActorUnavailable {
            key: key.to_string(),
        }
    }
}

impl From<tally_core::Error> for CounterError {
    fn from(e: tally_core::Error) -> Self {
        Self::InvalidKey(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Option<CounterKey> {
        CounterKey::new("room1").ok()
    }

    #[test]
    fn should_create_storage_failure_from_persistence_error() {
        let Some(key) = key() else { return };
        let err = CounterError::storage_failure(&key, &PersistenceError::query_failed("disk full"));
        assert!(matches!(err, CounterError::StorageFailure { .. }));
        assert!(err.to_string().contains("room1"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn should_create_migration_failed_error() {
        let Some(key) = key() else { return };
        let err = CounterError::migration_failed(&key, "parse error");
        assert_eq!(
            err.to_string(),
            "Migration failed for counter 'room1': parse error"
        );
    }

    #[test]
    fn should_convert_invalid_key() {
        let err: CounterError = tally_core::Error::invalid_key("", "key is empty").into();
        assert!(matches!(err, CounterError::InvalidKey(_)));
    }
}
