//! Startup: check the config, open the runtime settings store, build and
//! register every configured site.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use openerp_core::{ServiceConfig, StaticTokens};
use openerp_kv::{KVStore, RedbStore};
use openerp_site::{KvConfigStore, Site, SiteOptions, SiteRegistry};
use tracing::info;

use crate::config::ServerConfig;

/// Refuse configurations the server cannot start with.
pub fn verify_config(config: &ServerConfig) -> anyhow::Result<()> {
    if config.storage.data_dir.is_empty() {
        anyhow::bail!("Storage data_dir is empty in configuration.");
    }
    if config.sites.is_empty() {
        anyhow::bail!("No [[sites]] configured.");
    }
    if config.server.alone && config.sites.len() > 1 {
        anyhow::bail!(
            "server.alone is set but {} sites are configured",
            config.sites.len()
        );
    }
    for entry in &config.sites {
        if entry.name.trim().is_empty() {
            anyhow::bail!("A [[sites]] entry has no name.");
        }
        if entry.config_file.is_some() && entry.config.is_some() {
            anyhow::bail!("site {:?}: give config_file or config, not both", entry.name);
        }
    }
    Ok(())
}

/// Process-wide paths derived from the server config and the CLI.
pub fn service_config(config: &ServerConfig, listen: &str) -> ServiceConfig {
    ServiceConfig {
        data_dir: Some(PathBuf::from(&config.storage.data_dir)),
        config_db: config.storage.config_db.as_ref().map(PathBuf::from),
        listen: listen.to_string(),
        alone: config.server.alone,
    }
}

/// Registry with runtime settings persisted in redb.
pub fn open_registry(service: &ServiceConfig) -> anyhow::Result<SiteRegistry> {
    let data_dir = service.resolve_data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;

    let path = service.resolve_config_db();
    let kv: Arc<dyn KVStore> = Arc::new(
        RedbStore::open(&path).map_err(|e| anyhow::anyhow!("failed to open config store: {}", e))?,
    );
    let store = Arc::new(KvConfigStore::new(kv));
    let registry = SiteRegistry::with_config_store(store.clone(), store);
    Ok(if service.alone { registry.alone() } else { registry })
}

/// Build, initialize and register every configured site with its host
/// and path bindings.
pub fn register_sites(
    registry: &SiteRegistry,
    config: &ServerConfig,
    service: &ServiceConfig,
) -> anyhow::Result<()> {
    let options = SiteOptions::new(service.resolve_data_dir());
    for entry in &config.sites {
        let mut site = Site::new(&entry.name, entry.site_config()?, &options);
        site.init()
            .with_context(|| format!("initializing site {:?}", entry.name))?;
        registry.add(Arc::new(site))?;

        for host in &entry.hosts {
            registry.add_host(&entry.name, host)?;
        }
        for path in &entry.paths {
            registry.add_path(&entry.name, path)?;
        }
        info!(
            site = %entry.name,
            hosts = ?entry.hosts,
            paths = ?entry.paths,
            "site registered"
        );
    }
    Ok(())
}

/// Bearer tokens from `[[tokens]]`.
pub fn tokens(config: &ServerConfig) -> StaticTokens {
    let mut tokens = StaticTokens::new();
    for t in &config.tokens {
        tokens.insert(t.token.clone(), t.identity());
    }
    tokens
}
