use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::BlobError;
use crate::traits::{BlobMeta, BlobStore, check_key, join_url};

/// In-memory object store. Used for tests and throwaway sites.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    url_prefix: String,
}

impl MemoryStore {
    pub fn new(url_prefix: &str) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> BlobError {
    BlobError::Io(e.to_string())
}

impl BlobStore for MemoryStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<(), BlobError> {
        check_key(key)?;
        self.objects
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        check_key(key)?;
        Ok(self.objects.read().map_err(poisoned)?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        check_key(key)?;
        self.objects.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, BlobError> {
        check_key(key)?;
        Ok(self.objects.read().map_err(poisoned)?.contains_key(key))
    }

    fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, BlobError> {
        let objects = self.objects.read().map_err(poisoned)?;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| BlobMeta {
                key: k.clone(),
                size: v.len() as u64,
            })
            .collect())
    }

    fn url(&self, key: &str) -> String {
        join_url(&self.url_prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_by_prefix() {
        let store = MemoryStore::new("/m");
        store.put("a/1", b"x").unwrap();
        store.put("a/2", b"yy").unwrap();
        store.put("b/1", b"z").unwrap();
        let keys: Vec<String> = store.list("a/").unwrap().into_iter().map(|m| m.key).collect();
        assert_eq!(keys, vec!["a/1", "a/2"]);
        assert_eq!(store.url("a/1"), "/m/a/1");
    }
}
