use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BlobError;
use crate::traits::{BlobMeta, BlobStore, check_key, join_url};

fn io_err(e: std::io::Error) -> BlobError {
    BlobError::Io(e.to_string())
}

/// Filesystem-backed object store.
///
/// Keys map to paths under `root`:
///   key "avatars/42.png" → `{root}/avatars/42.png`, served at `{url_prefix}/avatars/42.png`.
///
/// Every site gets one of these rooted at its root directory as the
/// `system` storage.
pub struct FileStore {
    root: PathBuf,
    url_prefix: String,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: &Path, url_prefix: &str) -> Result<Self, BlobError> {
        fs::create_dir_all(root).map_err(io_err)?;
        Ok(Self {
            root: root.to_path_buf(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError> {
        check_key(key)?;
        Ok(self.root.join(key))
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<BlobMeta>) -> Result<(), BlobError> {
        if !dir.is_dir() {
            return Ok(());
        }
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let path = entry.path();
            if path.is_dir() {
                self.walk(&path, prefix, out)?;
                continue;
            }
            let Ok(rel) = path.strip_prefix(&self.root) else {
                continue;
            };
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                let size = entry.metadata().map_err(io_err)?.len();
                out.push(BlobMeta { key, size });
            }
        }
        Ok(())
    }
}

impl BlobStore for FileStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<(), BlobError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&path, data).map_err(io_err)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let path = self.resolve(key)?;
        if !path.is_file() {
            return Ok(None);
        }
        fs::read(&path).map(Some).map_err(io_err)
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        let path = self.resolve(key)?;
        if path.is_file() {
            fs::remove_file(&path).map_err(io_err)?;
        }
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, BlobError> {
        Ok(self.resolve(key)?.is_file())
    }

    fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, BlobError> {
        let mut results = Vec::new();
        self.walk(&self.root, prefix, &mut results)?;
        results.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(results)
    }

    fn url(&self, key: &str) -> String {
        join_url(&self.url_prefix, key)
    }
}
