use crate::error::BlobError;

/// Metadata for a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub key: String,
    pub size: u64,
}

/// Object store owned by a site (media uploads, exports, system files).
///
/// Keys are path-like strings: `avatars/42.png`, `exports/2024-01.csv`.
/// Every store also knows how to render the public URL of a key so the
/// request layer can hand links to clients.
pub trait BlobStore: Send + Sync {
    /// Store an object. Overwrites if the key already exists.
    fn put(&self, key: &str, data: &[u8]) -> Result<(), BlobError>;

    /// Retrieve an object. Returns None if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError>;

    /// Delete an object. No-op if the key does not exist.
    fn delete(&self, key: &str) -> Result<(), BlobError>;

    /// Check whether an object exists.
    fn exists(&self, key: &str) -> Result<bool, BlobError>;

    /// List objects matching a key prefix, sorted by key.
    fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, BlobError>;

    /// Public URL of a key: `{url_prefix}/{key}`.
    fn url(&self, key: &str) -> String;

    /// URL of a key served from an explicit endpoint host.
    fn url_with_endpoint(&self, scheme: &str, host: &str, key: &str) -> String {
        format!("{}://{}{}", scheme, host, self.url(key))
    }
}

/// Reject keys that are empty, absolute or climb out of the store.
pub(crate) fn check_key(key: &str) -> Result<(), BlobError> {
    if key.is_empty() || key.starts_with('/') || key.starts_with('\\') {
        return Err(BlobError::InvalidKey(format!("{:?}", key)));
    }
    if key.split(['/', '\\']).any(|part| part == "..") {
        return Err(BlobError::InvalidKey(format!("path traversal in {:?}", key)));
    }
    Ok(())
}

pub(crate) fn join_url(prefix: &str, key: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), key.trim_start_matches('/'))
}
