//! Storage factories keyed by storage `type`.
//!
//! Site configs name storages and pick a type; the site asks the factory
//! set to open each one at init time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::BlobError;
use crate::file::FileStore;
use crate::memory::MemoryStore;
use crate::traits::BlobStore;

/// Configuration of one named storage.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Backend type: `filesystem` (default), `fs`, or `memory`.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// Filesystem root. Defaults to `{site_root}/storage/{name}`.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Public URL prefix. Defaults to `/{name}`.
    #[serde(default)]
    pub url_prefix: Option<String>,
}

impl StorageConfig {
    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or("filesystem")
    }

    pub fn resolve_root(&self, name: &str, site_root: &Path) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| site_root.join("storage").join(name))
    }

    pub fn resolve_url_prefix(&self, name: &str) -> String {
        self.url_prefix.clone().unwrap_or_else(|| format!("/{name}"))
    }
}

/// Opens a store for a named storage config under a site root.
pub type StorageOpener =
    Arc<dyn Fn(&str, &StorageConfig, &Path) -> Result<Arc<dyn BlobStore>, BlobError> + Send + Sync>;

/// Registry of storage backends by type name.
#[derive(Clone)]
pub struct StorageFactories {
    openers: HashMap<String, StorageOpener>,
}

impl Default for StorageFactories {
    fn default() -> Self {
        let mut f = Self {
            openers: HashMap::new(),
        };
        let fs: StorageOpener = Arc::new(|name: &str, config: &StorageConfig, site_root: &Path| {
            let store = FileStore::open(
                &config.resolve_root(name, site_root),
                &config.resolve_url_prefix(name),
            )?;
            Ok(Arc::new(store) as Arc<dyn BlobStore>)
        });
        f.register("filesystem", fs.clone());
        f.register("fs", fs);
        f.register(
            "memory",
            Arc::new(|name: &str, config: &StorageConfig, _: &Path| {
                Ok(Arc::new(MemoryStore::new(&config.resolve_url_prefix(name))) as Arc<dyn BlobStore>)
            }),
        );
        f
    }
}

impl StorageFactories {
    pub fn register(&mut self, kind: &str, opener: StorageOpener) {
        self.openers.insert(kind.to_string(), opener);
    }

    pub fn open(
        &self,
        name: &str,
        config: &StorageConfig,
        site_root: &Path,
    ) -> Result<Arc<dyn BlobStore>, BlobError> {
        let opener = self
            .openers
            .get(config.kind())
            .ok_or_else(|| BlobError::UnknownType(config.kind().to_string()))?;
        opener(name, config, site_root)
    }
}
