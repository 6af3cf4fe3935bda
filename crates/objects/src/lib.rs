//! # Tally Objects
//!
//! Per-key counter objects: a durable store per key with versioned schema
//! migrations, a single actor instance per key that serializes every
//! operation, and live fanout of committed counts to streaming clients.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

/// Counter actors and the key router
pub mod actors;

/// Per-key durable storage (SurrealDB)
pub mod persistence;

/// Instance gate and streaming connection sets
pub mod virtual_objects;

pub use actors::{CounterError, CounterRouter, RouterConfig};
pub use persistence::{MigrationSet, StoreConfig};
pub use tally_core::{CounterKey, UpdateMessage};
