//! Runtime site settings.
//!
//! The registry owns one getter and one setter factory; every site added
//! to it is wired with the getter and a setter scoped to its name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use openerp_kv::{KVStore, KVStoreExt};
use serde_json::Value;

use crate::error::SiteError;

/// Reads runtime settings of any site.
pub trait ConfigGetter: Send + Sync {
    fn get(&self, site: &str, key: &str) -> Result<Option<Value>, SiteError>;
}

/// Writes runtime settings of one site.
pub trait ConfigSetter: Send + Sync {
    fn set(&self, key: &str, value: &Value) -> Result<(), SiteError>;
    fn delete(&self, key: &str) -> Result<(), SiteError>;
}

/// Builds the setter handed to a site at registration.
pub trait ConfigSetterFactory: Send + Sync {
    fn setter(&self, site: &str) -> Arc<dyn ConfigSetter>;
}

fn kv_err(e: openerp_kv::KVError) -> SiteError {
    SiteError::Config(e.to_string())
}

fn key_of(site: &str, key: &str) -> String {
    format!("site/{site}/{key}")
}

// ── KV-backed ──

/// Settings persisted in a [`KVStore`] under `site/{name}/{key}` as JSON.
#[derive(Clone)]
pub struct KvConfigStore {
    kv: Arc<dyn KVStore>,
}

impl KvConfigStore {
    pub fn new(kv: Arc<dyn KVStore>) -> Self {
        Self { kv }
    }

    /// Remove every setting of a site.
    pub fn clear(&self, site: &str) -> Result<usize, SiteError> {
        self.kv.delete_prefix(&format!("site/{site}/")).map_err(kv_err)
    }
}

impl ConfigGetter for KvConfigStore {
    fn get(&self, site: &str, key: &str) -> Result<Option<Value>, SiteError> {
        self.kv.get_json(&key_of(site, key)).map_err(kv_err)
    }
}

impl ConfigSetterFactory for KvConfigStore {
    fn setter(&self, site: &str) -> Arc<dyn ConfigSetter> {
        Arc::new(KvSiteSetter {
            kv: self.kv.clone(),
            site: site.to_string(),
        })
    }
}

struct KvSiteSetter {
    kv: Arc<dyn KVStore>,
    site: String,
}

impl ConfigSetter for KvSiteSetter {
    fn set(&self, key: &str, value: &Value) -> Result<(), SiteError> {
        self.kv.set_json(&key_of(&self.site, key), value).map_err(kv_err)
    }

    fn delete(&self, key: &str) -> Result<(), SiteError> {
        self.kv.delete(&key_of(&self.site, key)).map_err(kv_err)
    }
}

// ── In-memory ──

/// Process-local settings; the registry default.
#[derive(Clone, Default)]
pub struct MemoryConfigStore {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> SiteError {
    SiteError::Config(e.to_string())
}

impl ConfigGetter for MemoryConfigStore {
    fn get(&self, site: &str, key: &str) -> Result<Option<Value>, SiteError> {
        Ok(self.values.read().map_err(poisoned)?.get(&key_of(site, key)).cloned())
    }
}

impl ConfigSetterFactory for MemoryConfigStore {
    fn setter(&self, site: &str) -> Arc<dyn ConfigSetter> {
        Arc::new(MemorySiteSetter {
            values: self.values.clone(),
            site: site.to_string(),
        })
    }
}

struct MemorySiteSetter {
    values: Arc<RwLock<HashMap<String, Value>>>,
    site: String,
}

impl ConfigSetter for MemorySiteSetter {
    fn set(&self, key: &str, value: &Value) -> Result<(), SiteError> {
        self.values
            .write()
            .map_err(poisoned)?
            .insert(key_of(&self.site, key), value.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), SiteError> {
        self.values.write().map_err(poisoned)?.remove(&key_of(&self.site, key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openerp_kv::RedbStore;
    use serde_json::json;

    #[test]
    fn kv_store_scopes_by_site() {
        let kv: Arc<dyn KVStore> = Arc::new(RedbStore::open_in_memory().unwrap());
        let store = KvConfigStore::new(kv);

        store.setter("a").set("title", &json!("A")).unwrap();
        store.setter("b").set("title", &json!("B")).unwrap();

        assert_eq!(store.get("a", "title").unwrap(), Some(json!("A")));
        assert_eq!(store.get("b", "title").unwrap(), Some(json!("B")));

        store.setter("a").delete("title").unwrap();
        assert_eq!(store.get("a", "title").unwrap(), None);
        assert_eq!(store.clear("b").unwrap(), 1);
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryConfigStore::new();
        store.setter("a").set("mail", &json!({"from": "x@y"})).unwrap();
        assert_eq!(store.get("a", "mail").unwrap().unwrap()["from"], "x@y");
        assert_eq!(store.get("b", "mail").unwrap(), None);
    }
}
