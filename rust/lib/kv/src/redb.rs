use std::path::Path;

use redb::backends::InMemoryBackend;
use redb::{Database, TableDefinition};

use crate::error::KVError;
use crate::traits::KVStore;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("site_config");

fn storage_err(e: impl std::fmt::Display) -> KVError {
    KVError::Storage(e.to_string())
}

/// KVStore backed by redb, a pure-Rust embedded key-value database.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a redb database at the given path.
    pub fn open(path: &Path) -> Result<Self, KVError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(storage_err)?;
        }
        let db = Database::create(path).map_err(storage_err)?;
        Self::with_table(db)
    }

    /// Create a store that lives only in memory (tests, alone-mode demos).
    pub fn open_in_memory() -> Result<Self, KVError> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(storage_err)?;
        Self::with_table(db)
    }

    fn with_table(db: Database) -> Result<Self, KVError> {
        let store = Self { db };
        // The table must exist before the first read transaction.
        store.write(|_| Ok(()))?;
        Ok(store)
    }

    fn write<R>(
        &self,
        f: impl FnOnce(&mut redb::Table<'_, &'static str, &'static [u8]>) -> Result<R, KVError>,
    ) -> Result<R, KVError> {
        let txn = self.db.begin_write().map_err(storage_err)?;
        let result = {
            let mut table = txn.open_table(TABLE).map_err(storage_err)?;
            f(&mut table)?
        };
        txn.commit().map_err(storage_err)?;
        Ok(result)
    }
}

impl KVStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError> {
        let txn = self.db.begin_read().map_err(storage_err)?;
        let table = txn.open_table(TABLE).map_err(storage_err)?;
        let value = table.get(key).map_err(storage_err)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError> {
        self.write(|table| {
            table.insert(key, value).map_err(storage_err)?;
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> Result<(), KVError> {
        self.write(|table| {
            table.remove(key).map_err(storage_err)?;
            Ok(())
        })
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError> {
        let txn = self.db.begin_read().map_err(storage_err)?;
        let table = txn.open_table(TABLE).map_err(storage_err)?;

        let mut results = Vec::new();
        for entry in table.range(prefix..).map_err(storage_err)? {
            let (key, value) = entry.map_err(storage_err)?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_string(), value.value().to_vec()));
        }
        Ok(results)
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize, KVError> {
        let keys: Vec<String> = self.scan(prefix)?.into_iter().map(|(k, _)| k).collect();
        self.write(|table| {
            for key in &keys {
                table.remove(key.as_str()).map_err(storage_err)?;
            }
            Ok(keys.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::KVStoreExt;

    #[test]
    fn set_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("cfg.redb")).unwrap();

        assert_eq!(store.get("site/main/title").unwrap(), None);
        store.set("site/main/title", b"Main").unwrap();
        assert_eq!(store.get("site/main/title").unwrap(), Some(b"Main".to_vec()));
        store.delete("site/main/title").unwrap();
        assert_eq!(store.get("site/main/title").unwrap(), None);
    }

    #[test]
    fn scan_and_delete_prefix() {
        let store = RedbStore::open_in_memory().unwrap();
        store.set("site/a/x", b"1").unwrap();
        store.set("site/a/y", b"2").unwrap();
        store.set("site/b/x", b"3").unwrap();

        let keys: Vec<String> = store.scan("site/a/").unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["site/a/x", "site/a/y"]);

        assert_eq!(store.delete_prefix("site/a/").unwrap(), 2);
        assert!(store.scan("site/a/").unwrap().is_empty());
        assert_eq!(store.scan("site/").unwrap().len(), 1);
    }

    #[test]
    fn json_helpers() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Mail {
            from: String,
        }

        let store = RedbStore::open_in_memory().unwrap();
        store.set_json("site/a/mail", &Mail { from: "a@b".into() }).unwrap();
        let mail: Mail = store.get_json("site/a/mail").unwrap().unwrap();
        assert_eq!(mail.from, "a@b");

        store.set("site/a/bad", b"{").unwrap();
        assert!(matches!(
            store.get_json::<Mail>("site/a/bad"),
            Err(KVError::Decode { key, .. }) if key == "site/a/bad"
        ));
    }
}
