//! Versioned schema migrations for counter stores.
//!
//! A [`MigrationSet`] is applied once per actor instance before the instance
//! serves any call. Applied versions are recorded in the `schema_migration`
//! ledger table; a recorded version is never applied again.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::client::ObjectStore;
use super::error::{PersistenceError, PersistenceResult, from_surrealdb_error};

/// Ledger table holding one record per applied migration.
pub const LEDGER_TABLE: &str = "schema_migration";

/// One schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    /// Monotonically increasing version
    pub version: u32,
    /// Short identifier recorded in the ledger
    pub name: &'static str,
    /// SurrealQL statements.
    ///
    /// The script runs inside the migrator's transaction, so it must not
    /// contain `BEGIN`, `COMMIT` or `CANCEL` statements of its own.
    pub script: &'static str,
}

impl Migration {
    /// Create a migration.
    #[must_use]
    pub const fn new(version: u32, name: &'static str, script: &'static str) -> Self {
        Self {
            version,
            name,
            script,
        }
    }
}

/// Ordered sequence of migrations, strictly ascending by version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

impl MigrationSet {
    /// Build a set, checking that versions are strictly ascending.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::MigrationOutOfOrder` on a version that
    /// does not exceed its predecessor.
    pub fn new(migrations: Vec<Migration>) -> PersistenceResult<Self> {
        for pair in migrations.windows(2) {
            if let [previous, next] = pair {
                if next.version <= previous.version {
                    return Err(PersistenceError::MigrationOutOfOrder {
                        version: next.version,
                        previous: previous.version,
                    });
                }
            }
        }
        Ok(Self { migrations })
    }

    /// Migrations in application order.
    #[must_use]
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Highest version in the set.
    #[must_use]
    pub fn latest_version(&self) -> Option<u32> {
        self.migrations.last().map(|m| m.version)
    }

    /// Number of migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

/// Schema of the counter store.
#[must_use]
pub fn counter_migrations() -> MigrationSet {
    MigrationSet {
        migrations: vec![
            Migration::new(
                1,
                "create_counter",
                "DEFINE TABLE counter SCHEMAFULL;
                 DEFINE FIELD count ON TABLE counter TYPE int DEFAULT 0;",
            ),
            Migration::new(
                2,
                "counter_updated_at",
                "DEFINE FIELD updated_at ON TABLE counter TYPE option<datetime>;",
            ),
        ],
    }
}

/// Outcome of one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Versions applied by this run
    pub applied: Vec<u32>,
    /// Versions already present in the ledger
    pub skipped: Vec<u32>,
}

impl MigrationReport {
    /// True when the run applied nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Applies a [`MigrationSet`] against an [`ObjectStore`].
pub struct Migrator;

impl Migrator {
    /// Apply every migration missing from the ledger, in ascending order.
    ///
    /// Each script runs in one transaction together with its ledger record,
    /// so a version is either fully applied and recorded or not at all.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::MigrationFailed` for the first migration
    /// that fails; later migrations are not attempted.
    pub async fn apply_all(
        store: &ObjectStore,
        set: &MigrationSet,
    ) -> PersistenceResult<MigrationReport> {
        let applied = Self::applied_versions(store).await?;
        let mut report = MigrationReport::default();

        for migration in set.migrations() {
            if applied.contains(&migration.version) {
                report.skipped.push(migration.version);
                continue;
            }

            Self::apply_one(store, migration).await.inspect_err(|e| {
                warn!(
                    key = %store.key(),
                    version = migration.version,
                    name = migration.name,
                    error = %e,
                    "Migration failed"
                );
            })?;

            info!(
                key = %store.key(),
                version = migration.version,
                name = migration.name,
                "Applied migration"
            );
            report.applied.push(migration.version);
        }

        debug!(
            key = %store.key(),
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "Migration run complete"
        );
        Ok(report)
    }

    /// Versions recorded in the ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be created or read.
    pub async fn applied_versions(store: &ObjectStore) -> PersistenceResult<BTreeSet<u32>> {
        store
            .db()
            .query(format!("DEFINE TABLE IF NOT EXISTS {LEDGER_TABLE} SCHEMALESS"))
            .await
            .map_err(|e| PersistenceError::migration_failed(0, e.to_string()))?
            .check()
            .map_err(|e| PersistenceError::migration_failed(0, e.to_string()))?;

        let versions: Vec<i64> = store
            .db()
            .query(format!("SELECT VALUE version FROM {LEDGER_TABLE}"))
            .await
            .map_err(from_surrealdb_error)?
            .take(0)
            .map_err(from_surrealdb_error)?;

        Ok(versions
            .into_iter()
            .filter_map(|v| u32::try_from(v).ok())
            .collect())
    }

    async fn apply_one(store: &ObjectStore, migration: &Migration) -> PersistenceResult<()> {
        let failed =
            |e: surrealdb::Error| PersistenceError::migration_failed(migration.version, e.to_string());

        store
            .db()
            .query("BEGIN TRANSACTION")
            .query(migration.script)
            .query(format!(
                "CREATE type::thing('{LEDGER_TABLE}', $version) \
                 SET version = $version, name = $name, applied_at = time::now()"
            ))
            .query("COMMIT TRANSACTION")
            .bind(("version", i64::from(migration.version)))
            .bind(("name", migration.name))
            .await
            .map_err(failed)?
            .check()
            .map_err(failed)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::StoreConfig;
    use tally_core::CounterKey;

    async fn store() -> Option<ObjectStore> {
        let key = CounterKey::new("migrations").ok()?;
        ObjectStore::connect(&StoreConfig::in_memory(), key).await.ok()
    }

    #[test]
    fn test_builtin_set_is_ordered() {
        let set = counter_migrations();
        assert!(MigrationSet::new(set.migrations().to_vec()).is_ok());
        assert_eq!(set.latest_version(), Some(2));
    }

    #[test]
    fn test_rejects_descending_versions() {
        let set = MigrationSet::new(vec![
            Migration::new(2, "b", "DEFINE TABLE b;"),
            Migration::new(1, "a", "DEFINE TABLE a;"),
        ]);
        assert!(matches!(
            set,
            Err(PersistenceError::MigrationOutOfOrder {
                version: 1,
                previous: 2
            })
        ));
    }

    #[test]
    fn test_rejects_duplicate_versions() {
        let set = MigrationSet::new(vec![
            Migration::new(1, "a", "DEFINE TABLE a;"),
            Migration::new(1, "a_again", "DEFINE TABLE a;"),
        ]);
        assert!(set.is_err());
    }

    #[tokio::test]
    async fn test_apply_all_on_fresh_store() {
        let Some(store) = store().await else {
            eprintln!("Skipping test: store setup failed");
            return;
        };

        let report = Migrator::apply_all(&store, &counter_migrations()).await;
        assert!(report.is_ok(), "migrations should apply: {:?}", report.err());
        if let Ok(report) = report {
            assert_eq!(report.applied, vec![1, 2]);
            assert!(report.skipped.is_empty());
        }
    }

    #[tokio::test]
    async fn test_apply_all_twice_is_noop() {
        let Some(store) = store().await else {
            eprintln!("Skipping test: store setup failed");
            return;
        };

        let first = Migrator::apply_all(&store, &counter_migrations()).await;
        assert!(first.is_ok());

        let second = Migrator::apply_all(&store, &counter_migrations()).await;
        assert!(second.is_ok());
        if let Ok(report) = second {
            assert!(report.is_noop());
            assert_eq!(report.skipped, vec![1, 2]);
        }
    }

    #[tokio::test]
    async fn test_failed_migration_is_not_recorded() {
        let Some(store) = store().await else {
            eprintln!("Skipping test: store setup failed");
            return;
        };

        let set = MigrationSet::new(vec![
            Migration::new(1, "ok", "DEFINE TABLE first SCHEMALESS;"),
            Migration::new(2, "broken", "THIS IS NOT A STATEMENT;"),
        ]);
        let Ok(set) = set else {
            return;
        };

        let result = Migrator::apply_all(&store, &set).await;
        assert!(matches!(
            result,
            Err(PersistenceError::MigrationFailed { version: 2, .. })
        ));

        let applied = Migrator::applied_versions(&store).await;
        assert_eq!(applied.ok(), Some(BTreeSet::from([1])));
    }

    #[tokio::test]
    async fn test_script_ending_in_comment_applies() {
        let Some(store) = store().await else {
            eprintln!("Skipping test: store setup failed");
            return;
        };

        let set = MigrationSet::new(vec![Migration::new(
            1,
            "notes",
            "DEFINE TABLE note SCHEMALESS;\n-- notes are free-form",
        )]);
        let Ok(set) = set else {
            return;
        };

        let report = Migrator::apply_all(&store, &set).await;
        assert!(report.is_ok(), "commented script should apply: {:?}", report.err());

        let applied = Migrator::applied_versions(&store).await;
        assert_eq!(applied.ok(), Some(BTreeSet::from([1])));
    }
}
