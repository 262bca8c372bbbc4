use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::KVError;

/// KVStore provides the key-value interface behind runtime site settings.
///
/// Keys are slash-namespaced: `site/main/title`, `site/main/mail/from`.
pub trait KVStore: Send + Sync {
    /// Get the value for a key. Returns None if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError>;

    /// Set a key-value pair, replacing any previous value.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError>;

    /// Delete a key. No-op if the key does not exist.
    fn delete(&self, key: &str) -> Result<(), KVError>;

    /// Scan all keys matching a prefix. Returns sorted (key, value) pairs.
    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError>;

    /// Delete every key matching a prefix. Returns the number removed.
    fn delete_prefix(&self, prefix: &str) -> Result<usize, KVError> {
        let keys = self.scan(prefix)?;
        for (key, _) in &keys {
            self.delete(key)?;
        }
        Ok(keys.len())
    }
}

/// JSON helpers on top of any [`KVStore`].
pub trait KVStoreExt: KVStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, KVError> {
        match self.get(key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| KVError::Decode {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), KVError> {
        let bytes = serde_json::to_vec(value).map_err(|e| KVError::Encode {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.set(key, &bytes)
    }
}

impl<S: KVStore + ?Sized> KVStoreExt for S {}
