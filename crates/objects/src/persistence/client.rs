//! SurrealDB client for counter object persistence.
//!
//! Every counter key owns a separate embedded datastore. The
//! [`StoreProvider`] opens each datastore once and hands out clones, so a
//! store outlives the actor instances that use it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sha2::{Digest, Sha256};
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use tally_core::CounterKey;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::error::{PersistenceError, PersistenceResult, from_surrealdb_error};

const MEMORY_URL: &str = "mem://";
const ROCKSDB_SCHEME: &str = "rocksdb://";

/// Attempts to open a durable store whose previous handle may still be
/// closing.
const OPEN_ATTEMPTS: u32 = 10;
const OPEN_BACKOFF: Duration = Duration::from_millis(20);

/// Configuration for counter stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Engine URL: `mem://` or `rocksdb://<root directory>`
    pub url: String,
    /// Namespace to use
    pub namespace: String,
    /// Database to use inside each key's datastore
    pub database: String,
}

impl StoreConfig {
    /// Create an in-memory configuration for testing.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            url: MEMORY_URL.to_string(),
            namespace: "tally".to_string(),
            database: "counter".to_string(),
        }
    }

    /// Create a RocksDB configuration rooted at `root`.
    ///
    /// Each key's datastore lives in its own subdirectory of `root`.
    #[must_use]
    pub fn rocksdb(root: impl AsRef<str>) -> Self {
        Self {
            url: format!("{ROCKSDB_SCHEME}{}", root.as_ref()),
            ..Self::in_memory()
        }
    }

    /// Set the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Whether stores outlive the process.
    ///
    /// An in-memory store is the only copy of its key's state, so it is
    /// never released.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        self.url.starts_with(ROCKSDB_SCHEME)
    }

    /// Engine URL of the datastore that belongs to `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured URL uses an unsupported engine.
    pub fn url_for(&self, key: &CounterKey) -> PersistenceResult<String> {
        if self.url == MEMORY_URL {
            return Ok(MEMORY_URL.to_string());
        }
        match self.url.strip_prefix(ROCKSDB_SCHEME) {
            Some(root) => Ok(format!(
                "{ROCKSDB_SCHEME}{}/{}",
                root.trim_end_matches('/'),
                storage_id(key)
            )),
            None => Err(PersistenceError::connection_failed(format!(
                "unsupported store url '{}': expected mem:// or rocksdb://",
                self.url
            ))),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Stable, filesystem-safe identifier for a key's datastore.
#[must_use]
pub fn storage_id(key: &CounterKey) -> String {
    format!("{:x}", Sha256::digest(key.as_str().as_bytes()))
}

/// Connection to one counter key's datastore.
///
/// This is a thin wrapper around the SurrealDB client that provides
/// counter-specific error handling.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    db: Arc<Surreal<Any>>,
    key: CounterKey,
}

impl ObjectStore {
    /// Open the datastore that belongs to `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be opened or the namespace
    /// cannot be selected.
    pub async fn connect(config: &StoreConfig, key: CounterKey) -> PersistenceResult<Self> {
        let url = config.url_for(&key)?;
        let db = Surreal::<Any>::init();

        db.connect(url.as_str())
            .await
            .map_err(|e| PersistenceError::connection_failed(e.to_string()))?;

        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await
            .map_err(from_surrealdb_error)?;

        debug!(key = %key, url = %url, "Opened counter store");

        Ok(Self {
            db: Arc::new(db),
            key,
        })
    }

    /// Get a reference to the underlying database client.
    #[must_use]
    pub fn db(&self) -> &Surreal<Any> {
        &self.db
    }

    /// Key this store belongs to.
    #[must_use]
    pub fn key(&self) -> &CounterKey {
        &self.key
    }
}

/// Opens and caches one [`ObjectStore`] per key.
///
/// Opening is serialized per key only; different keys open in parallel.
/// Durable stores can be released once their key goes idle and are
/// reopened on the next use.
#[derive(Debug)]
pub struct StoreProvider {
    config: StoreConfig,
    stores: Mutex<HashMap<CounterKey, Arc<OnceCell<ObjectStore>>>>,
}

impl StoreProvider {
    /// Create a provider for the given configuration.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        info!(url = %config.url, namespace = %config.namespace, "Counter store provider ready");
        Self {
            config,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get the store for `key`, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened. A failed open is not
    /// cached; the next call tries again.
    pub async fn open(&self, key: &CounterKey) -> PersistenceResult<ObjectStore> {
        let cell = {
            let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(stores.entry(key.clone()).or_default())
        };

        cell.get_or_try_init(|| self.connect(key))
            .await
            .cloned()
    }

    /// Drop the cached store for `key` so its datastore closes.
    ///
    /// In-memory stores are kept. Returns whether a store was released.
    pub fn release(&self, key: &CounterKey) -> bool {
        if !self.config.is_durable() {
            return false;
        }
        let released = self
            .stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some_and(|cell| cell.initialized());
        if released {
            debug!(key = %key, "Released counter store");
        }
        released
    }

    /// Number of stores currently open.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }
}

impl StoreProvider {
    async fn connect(&self, key: &CounterKey) -> PersistenceResult<ObjectStore> {
        let mut attempt: u32 = 1;
        loop {
            match ObjectStore::connect(&self.config, key.clone()).await {
                Err(err)
                    if self.config.is_durable()
                        && err.is_retryable()
                        && attempt < OPEN_ATTEMPTS =>
                {
                    debug!(key = %key, attempt, error = %err, "Counter store busy, reopening");
                    tokio::time::sleep(OPEN_BACKOFF.saturating_mul(attempt)).await;
                    attempt = attempt.saturating_add(1);
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Option<CounterKey> {
        CounterKey::new(s).ok()
    }

    #[test]
    fn test_store_config_in_memory() {
        let config = StoreConfig::in_memory();
        assert_eq!(config.url, "mem://");
        assert_eq!(config.namespace, "tally");
        assert_eq!(config.database, "counter");
    }

    #[test]
    fn test_memory_url_is_shared_scheme() {
        let config = StoreConfig::in_memory();
        if let Some(k) = key("room1") {
            assert_eq!(config.url_for(&k).ok().as_deref(), Some("mem://"));
        }
    }

    #[test]
    fn test_rocksdb_url_uses_storage_id() {
        let config = StoreConfig::rocksdb("/var/lib/tally/");
        if let Some(k) = key("room1") {
            let url = config.url_for(&k);
            assert_eq!(
                url.ok(),
                Some(format!("rocksdb:///var/lib/tally/{}", storage_id(&k)))
            );
        }
    }

    #[test]
    fn test_unsupported_url_rejected() {
        let config = StoreConfig {
            url: "ws://localhost:8000".to_string(),
            ..StoreConfig::in_memory()
        };
        if let Some(k) = key("room1") {
            assert!(matches!(
                config.url_for(&k),
                Err(PersistenceError::ConnectionFailed { .. })
            ));
        }
    }

    #[test]
    fn test_storage_id_is_stable_hex() {
        if let (Some(a), Some(b)) = (key("a"), key("b")) {
            assert_eq!(storage_id(&a), storage_id(&a));
            assert_ne!(storage_id(&a), storage_id(&b));
            assert_eq!(storage_id(&a).len(), 64);
            assert!(storage_id(&a).chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[tokio::test]
    async fn test_connect_in_memory() {
        if let Some(k) = key("room1") {
            let store = ObjectStore::connect(&StoreConfig::in_memory(), k).await;
            assert!(store.is_ok(), "should open in-memory store");
            if let Ok(store) = store {
                assert_eq!(store.key().as_str(), "room1");
            }
        }
    }

    #[tokio::test]
    async fn test_provider_caches_per_key() {
        let provider = StoreProvider::new(StoreConfig::in_memory());
        if let (Some(a), Some(b)) = (key("a"), key("b")) {
            assert!(provider.open(&a).await.is_ok());
            assert!(provider.open(&a).await.is_ok());
            assert!(provider.open(&b).await.is_ok());
            assert_eq!(provider.open_count(), 2);
        }
    }

    #[tokio::test]
    async fn test_memory_stores_are_never_released() {
        let provider = StoreProvider::new(StoreConfig::in_memory());
        if let Some(k) = key("room1") {
            assert!(provider.open(&k).await.is_ok());
            assert!(!provider.release(&k));
            assert_eq!(provider.open_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_released_rocksdb_store_reopens() {
        let Ok(dir) = tempfile::tempdir() else {
            eprintln!("Skipping test: no temp dir");
            return;
        };
        let root = dir.path().to_string_lossy().into_owned();
        let provider = StoreProvider::new(StoreConfig::rocksdb(root));
        let Some(k) = key("room1") else { return };

        let first = provider.open(&k).await;
        assert!(first.is_ok(), "first open failed: {:?}", first.err());
        drop(first);

        assert!(provider.release(&k));
        assert_eq!(provider.open_count(), 0);
        assert!(!provider.release(&k));

        // The datastore may still be closing; open waits it out.
        let second = provider.open(&k).await;
        assert!(second.is_ok(), "reopen failed: {:?}", second.err());
        assert_eq!(provider.open_count(), 1);
    }

    #[test]
    fn test_only_rocksdb_is_durable() {
        assert!(!StoreConfig::in_memory().is_durable());
        assert!(StoreConfig::rocksdb("/tmp/tally").is_durable());
    }
}
