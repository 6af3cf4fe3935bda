//! Persistence layer for counter objects.
//!
//! This module provides SurrealDB-backed persistence for:
//! - One embedded datastore per counter key
//! - Versioned schema migrations with an applied-version ledger
//! - The single counter row of each key
//!
//! # Architecture
//!
//! - `StoreProvider`: opens and caches one `ObjectStore` per key
//! - `ObjectStore`: connection to one key's datastore, with the counter
//!   row operations (`get_or_create`, `increment`, `decrement`)
//! - `Migrator`: applies a `MigrationSet` exactly once per version
//!
//! # Example
//!
//! ```ignore
//! use tally_objects::persistence::{Migrator, ObjectStore, StoreConfig, counter_migrations};
//!
//! let store = ObjectStore::connect(&StoreConfig::in_memory(), key).await?;
//! Migrator::apply_all(&store, &counter_migrations()).await?;
//! let count = store.increment().await?;
//! ```

pub mod client;
pub mod counter_store;
pub mod error;
pub mod migrations;

// Re-export main types
pub use client::{ObjectStore, StoreConfig, StoreProvider, storage_id};
pub use counter_store::{COUNTER_ROW_ID, COUNTER_TABLE, CounterRow};
pub use error::{PersistenceError, PersistenceResult};
pub use migrations::{
    LEDGER_TABLE, Migration, MigrationReport, MigrationSet, Migrator, counter_migrations,
};
