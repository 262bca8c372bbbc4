//! Server configuration file.
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! default_locale = "en-US"
//!
//! [storage]
//! data_dir = "/var/lib/openerp"
//!
//! [[tokens]]
//! token = "s3cret"
//! id = "1"
//! name = "admin"
//! roles = ["admin"]
//!
//! [[sites]]
//! name = "main"
//! hosts = ["shop.example.com"]
//! paths = ["/main"]
//! config_file = "sites/main.toml"
//!
//! [[sites]]
//! name = "demo"
//! paths = ["/demo"]
//! [sites.config]
//! title = "Demo"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use openerp_core::Identity;
use openerp_site::SiteConfig;
use serde::Deserialize;

const CONFIG_DIR: &str = "/etc/openerp";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
    #[serde(default)]
    pub sites: Vec<SiteEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub listen: Option<String>,
    /// Allow a single site only.
    #[serde(default)]
    pub alone: bool,
    #[serde(default)]
    pub default_locale: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSection {
    #[serde(default)]
    pub data_dir: String,
    /// Runtime site settings. Defaults to `{data_dir}/site-config.redb`.
    #[serde(default)]
    pub config_db: Option<String>,
}

/// A static bearer token and the caller it stands for.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub time_location: Option<String>,
}

impl TokenConfig {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            name: self.name.clone(),
            roles: self.roles.clone(),
            time_location: self.time_location.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteEntry {
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    /// Site config file, relative to the server config file.
    #[serde(default)]
    pub config_file: Option<String>,
    /// Inline site config, used when no file is given.
    #[serde(default)]
    pub config: Option<toml::Table>,
}

impl ServerConfig {
    /// `name` is a bare context name (`/etc/openerp/<name>.toml`) or a path.
    pub fn resolve_path(name: &str) -> PathBuf {
        if name.contains('/') || name.contains('.') {
            PathBuf::from(name)
        } else {
            Path::new(CONFIG_DIR).join(format!("{name}.toml"))
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(dir) = path.parent() {
            config.relativize(dir);
        }
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("parsing server config")
    }

    /// Make site config file paths relative to `base`.
    fn relativize(&mut self, base: &Path) {
        for entry in &mut self.sites {
            if let Some(file) = &entry.config_file {
                if Path::new(file).is_relative() {
                    entry.config_file = Some(base.join(file).display().to_string());
                }
            }
        }
    }
}

impl SiteEntry {
    pub fn site_config(&self) -> anyhow::Result<SiteConfig> {
        if let Some(file) = &self.config_file {
            return SiteConfig::from_file(Path::new(file))
                .with_context(|| format!("site {:?}", self.name));
        }
        match &self.config {
            Some(table) => {
                let text = toml::to_string(table)?;
                SiteConfig::from_toml_str(&text).with_context(|| format!("site {:?}", self.name))
            }
            None => Ok(SiteConfig::default()),
        }
    }
}
