//! Server configuration: an optional TOML file, overridden by CLI flags.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tally_objects::actors::DEFAULT_CONNECTION_BUFFER;
use tally_objects::{RouterConfig, StoreConfig};
use tally_web::ServerConfig;

use crate::cli::ServeArgs;

const MEM_URL: &str = "mem://";
const ROCKSDB_SCHEME: &str = "rocksdb://";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    pub log_level: String,
    pub server: ServerConfig,
    pub store: StoreSection,
    pub objects: ObjectsSection,
}

/// `[store]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// `mem://` or `rocksdb://<dir>`
    pub url: String,
    pub namespace: String,
}

/// `[objects]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectsSection {
    /// Idle seconds before an instance hibernates; absent keeps instances live
    pub hibernate_after_secs: Option<u64>,
    /// Outbound queue length per WebSocket connection
    pub connection_buffer: usize,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server: ServerConfig::default(),
            store: StoreSection::default(),
            objects: ObjectsSection::default(),
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        let defaults = StoreConfig::in_memory();
        Self {
            url: MEM_URL.to_string(),
            namespace: defaults.namespace,
        }
    }
}

impl Default for ObjectsSection {
    fn default() -> Self {
        Self {
            hibernate_after_secs: None,
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
        }
    }
}

impl TallyConfig {
    /// Load from `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply CLI flags on top of the file.
    #[must_use]
    pub fn with_overrides(mut self, args: &ServeArgs) -> Self {
        if let Some(bind) = &args.bind {
            self.server.bind_address.clone_from(bind);
        }
        if let Some(url) = &args.store {
            self.store.url.clone_from(url);
        }
        if let Some(secs) = args.hibernate_after_secs {
            self.objects.hibernate_after_secs = Some(secs);
        }
        if let Some(level) = &args.log_level {
            self.log_level.clone_from(level);
        }
        self
    }

    /// Store settings for the counter objects.
    pub fn store_config(&self) -> Result<StoreConfig> {
        let base = if self.store.url == MEM_URL {
            StoreConfig::in_memory()
        } else if let Some(dir) = self.store.url.strip_prefix(ROCKSDB_SCHEME) {
            if dir.is_empty() {
                bail!("rocksdb store URL needs a directory: {}", self.store.url);
            }
            StoreConfig::rocksdb(dir)
        } else {
            bail!(
                "Unsupported store URL {} (expected {MEM_URL} or {ROCKSDB_SCHEME}<dir>)",
                self.store.url
            );
        };

        Ok(base.with_namespace(self.store.namespace.clone()))
    }

    /// Instance lifecycle settings.
    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        let config = RouterConfig::default().with_connection_buffer(self.objects.connection_buffer);
        match self.objects.hibernate_after_secs {
            Some(secs) => config.with_hibernate_after(Duration::from_secs(secs)),
            None => config,
        }
    }
}
