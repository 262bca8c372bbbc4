//! Static site configuration.
//!
//! A site is described by a TOML (or JSON) blob:
//!
//! ```toml
//! title = "Main"
//! public_url = "https://example.com/admin"
//! locale = "en-US"
//! time_location = "America/Sao_Paulo"
//!
//! [db.system]
//! adapter = "sqlite"
//!
//! [storage.media]
//! type = "filesystem"
//! ```
//!
//! `prepare` fills defaults and expands the `{DATA_DIR}`, `{SITE_NAME}`,
//! `{SITE_ROOT}` and `{DB_NAME}` placeholders.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use openerp_blob::StorageConfig;
use openerp_sql::DbConfig;
use serde::Deserialize;

use crate::error::SiteError;

/// Name of the DB every site must have.
pub const SYSTEM_DB: &str = "system";

/// Name of the storage aliased to the first configured one.
pub const DEFAULT_STORAGE: &str = "default";

/// Name of the filesystem storage rooted at the site root.
pub const SYSTEM_STORAGE: &str = "system";

const DEFAULT_ROOT_DIR: &str = "{DATA_DIR}/sites/{SITE_NAME}";
const DEFAULT_SQLITE_NAME: &str = "{SITE_ROOT}/db/{DB_NAME}.db";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub public_url: String,
    #[serde(default)]
    pub static_url: String,
    #[serde(default)]
    pub locale: String,
    /// IANA time zone name.
    #[serde(default)]
    pub time_location: String,
    #[serde(default)]
    pub root_dir: String,
    /// DBs by key, in declaration order.
    #[serde(default)]
    pub db: IndexMap<String, DbConfig>,
    /// Media storages by name, in declaration order. The first is the default.
    #[serde(default)]
    pub storage: IndexMap<String, StorageConfig>,
    /// Free-form settings read through `Site::config_value`.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn expand(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter()
        .fold(template.to_string(), |acc, (k, v)| acc.replace(k, v))
}

impl SiteConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, SiteError> {
        toml::from_str(s).map_err(|e| SiteError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, SiteError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SiteError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Fill defaults for a site named `site_name` under `data_dir`.
    pub fn prepare(&mut self, site_name: &str, data_dir: &Path) {
        let data_dir = data_dir.to_string_lossy().to_string();

        if self.root_dir.is_empty() {
            self.root_dir = DEFAULT_ROOT_DIR.to_string();
        }
        self.root_dir = expand(
            &self.root_dir,
            &[("{DATA_DIR}", &data_dir), ("{SITE_NAME}", site_name)],
        );

        if !self.db.contains_key(SYSTEM_DB) {
            self.db.shift_insert(0, SYSTEM_DB.to_string(), DbConfig::default());
        }

        let root = self.root_dir.clone();
        for (key, db) in self.db.iter_mut() {
            if db.adapter.is_empty() {
                db.adapter = "sqlite".to_string();
            }
            if db.is_sqlite() && db.name.is_empty() {
                db.name = DEFAULT_SQLITE_NAME.to_string();
            }
            db.name = expand(
                &db.name,
                &[
                    ("{SITE_ROOT}", &root),
                    ("{DB_NAME}", key),
                    ("{DATA_DIR}", &data_dir),
                    ("{SITE_NAME}", site_name),
                ],
            );
        }

        if self.static_url.is_empty() {
            self.static_url = self.public_url.clone();
        }
    }

    pub fn root_dir(&self) -> PathBuf {
        PathBuf::from(&self.root_dir)
    }

    /// Path component of the public URL, without a trailing slash.
    pub fn public_path(&self) -> String {
        let path = match url::Url::parse(&self.public_url) {
            Ok(u) => u.path().to_string(),
            Err(_) => self.public_url.clone(),
        };
        path.trim_end_matches('/').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_fills_defaults() {
        let mut config = SiteConfig::from_toml_str(
            r#"
            title = "Main"
            public_url = "https://example.com/admin/"

            [db.shop]
            adapter = "sqlite"

            [db.reports]
            adapter = "postgres"
            name = "reports_{SITE_NAME}"
            "#,
        )
        .unwrap();
        config.prepare("main", Path::new("/data"));

        assert_eq!(config.root_dir, "/data/sites/main");
        let keys: Vec<&str> = config.db.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["system", "shop", "reports"]);
        assert_eq!(config.db["system"].name, "/data/sites/main/db/system.db");
        assert_eq!(config.db["shop"].name, "/data/sites/main/db/shop.db");
        assert_eq!(config.db["reports"].name, "reports_main");
        assert_eq!(config.static_url, "https://example.com/admin/");
        assert_eq!(config.public_path(), "/admin");
    }

    #[test]
    fn storage_order_is_declaration_order() {
        let config = SiteConfig::from_toml_str(
            r#"
            [storage.media]
            type = "memory"
            [storage.archive]
            type = "filesystem"
            "#,
        )
        .unwrap();
        let names: Vec<&str> = config.storage.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["media", "archive"]);
    }

    #[test]
    fn bad_toml_is_config_error() {
        assert!(matches!(
            SiteConfig::from_toml_str("title = "),
            Err(SiteError::Config(_))
        ));
    }
}
