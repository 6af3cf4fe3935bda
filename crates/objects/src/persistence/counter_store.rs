//! Counter row persistence.
//!
//! A counter store holds at most one row, `counter:1`. It is created lazily
//! with `count = 0` and never deleted.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::client::ObjectStore;
use super::error::{PersistenceError, PersistenceResult, from_surrealdb_error};

/// Table holding the counter row.
pub const COUNTER_TABLE: &str = "counter";

/// Fixed id of the single counter row.
pub const COUNTER_ROW_ID: i64 = 1;

/// The durable state of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRow {
    /// Always [`COUNTER_ROW_ID`]
    pub id: i64,
    /// Current value, may be negative
    pub count: i64,
}

impl ObjectStore {
    /// Read the counter row, if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn counter_row(&self) -> PersistenceResult<Option<CounterRow>> {
        let counts: Vec<i64> = self
            .db()
            .query("SELECT VALUE count FROM type::thing($table, $id)")
            .bind(("table", COUNTER_TABLE))
            .bind(("id", COUNTER_ROW_ID))
            .await
            .map_err(from_surrealdb_error)?
            .take(0)
            .map_err(from_surrealdb_error)?;

        Ok(counts.into_iter().next().map(|count| CounterRow {
            id: COUNTER_ROW_ID,
            count,
        }))
    }

    /// Current count, creating the row with 0 if it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be read or created.
    pub async fn get_or_create(&self) -> PersistenceResult<i64> {
        if let Some(row) = self.counter_row().await? {
            return Ok(row.count);
        }

        self.db()
            .query("CREATE type::thing($table, $id) SET count = 0, updated_at = time::now()")
            .bind(("table", COUNTER_TABLE))
            .bind(("id", COUNTER_ROW_ID))
            .await
            .map_err(from_surrealdb_error)?
            .check()
            .map_err(from_surrealdb_error)?;

        debug!(key = %self.key(), "Created counter row");
        Ok(0)
    }

    /// Add one and return the new count.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or the write fails, or on overflow.
    pub async fn increment(&self) -> PersistenceResult<i64> {
        self.apply_delta(1).await
    }

    /// Subtract one and return the new count. There is no floor.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or the write fails, or on overflow.
    pub async fn decrement(&self) -> PersistenceResult<i64> {
        self.apply_delta(-1).await
    }

    /// Read-modify-write of the counter row.
    ///
    /// Callers must not run two of these concurrently against one store; the
    /// counter actor guarantees that.
    async fn apply_delta(&self, delta: i64) -> PersistenceResult<i64> {
        let current = self.get_or_create().await?;
        let next = current
            .checked_add(delta)
            .ok_or(PersistenceError::Overflow { count: current })?;

        self.db()
            .query("UPSERT type::thing($table, $id) SET count = $count, updated_at = time::now()")
            .bind(("table", COUNTER_TABLE))
            .bind(("id", COUNTER_ROW_ID))
            .bind(("count", next))
            .await
            .map_err(from_surrealdb_error)?
            .check()
            .map_err(from_surrealdb_error)?;

        Ok(next)
    }
}
