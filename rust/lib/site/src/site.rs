//! One tenant: config, DB handles, storages and lifecycle callbacks.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use indexmap::IndexMap;
use openerp_blob::{BlobStore, FileStore, StorageFactories};
use openerp_sql::{AdapterFactories, AdapterOpener, DbConfig, RawDb};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_STORAGE, SYSTEM_DB, SYSTEM_STORAGE, SiteConfig};
use crate::config_store::{ConfigGetter, ConfigSetter};
use crate::context::Context;
use crate::db::Db;
use crate::error::SiteError;
use crate::tz::TimeZone;

/// Callback run once, when the site leaves the registry or finishes init.
pub type SiteCallback = Box<dyn FnOnce(&Site) -> Result<(), SiteError> + Send + Sync>;

/// Backends used to open a site's DBs and storages.
#[derive(Clone)]
pub struct SiteOptions {
    pub data_dir: PathBuf,
    pub adapters: AdapterFactories,
    pub storages: StorageFactories,
    /// Open every DB during `init`.
    pub db_auto_connect: bool,
}

impl Default for SiteOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            adapters: AdapterFactories::default(),
            storages: StorageFactories::default(),
            db_auto_connect: true,
        }
    }
}

impl SiteOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }
}

pub struct Site {
    name: String,
    config: SiteConfig,
    options: SiteOptions,
    time_zone: TimeZone,
    dbs: IndexMap<String, Arc<Db>>,
    storages: IndexMap<String, Arc<dyn BlobStore>>,
    registered: AtomicBool,
    config_getter: OnceLock<Arc<dyn ConfigGetter>>,
    config_setter: OnceLock<Arc<dyn ConfigSetter>>,
    span: OnceLock<tracing::Span>,
    on_destroy: Mutex<Vec<SiteCallback>>,
    post_init: Vec<SiteCallback>,
}

impl Site {
    /// Build an uninitialized site. The config is prepared in place.
    pub fn new(name: &str, mut config: SiteConfig, options: &SiteOptions) -> Self {
        config.prepare(name, &options.data_dir);
        let time_zone = match config.time_location.as_str() {
            "" => TimeZone::Local,
            loc => TimeZone::from_name(loc).unwrap_or_else(|| {
                warn!(site = name, time_location = loc, "unknown time zone, using local");
                TimeZone::Local
            }),
        };
        Self {
            name: name.to_string(),
            config,
            options: options.clone(),
            time_zone,
            dbs: IndexMap::new(),
            storages: IndexMap::new(),
            registered: AtomicBool::new(false),
            config_getter: OnceLock::new(),
            config_setter: OnceLock::new(),
            span: OnceLock::new(),
            on_destroy: Mutex::new(Vec::new()),
            post_init: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn title(&self) -> &str {
        if self.config.title.is_empty() { &self.name } else { &self.config.title }
    }

    pub fn root_dir(&self) -> PathBuf {
        self.config.root_dir()
    }

    pub fn time_zone(&self) -> TimeZone {
        self.time_zone
    }

    // ── Init ──

    /// Register a callback run at the end of `init`.
    pub fn on_post_init(&mut self, cb: SiteCallback) {
        self.post_init.push(cb);
    }

    /// Open storages and DBs.
    pub fn init(&mut self) -> Result<(), SiteError> {
        let root = self.root_dir();
        self.init_storages(&root)?;
        self.init_dbs()?;

        for cb in std::mem::take(&mut self.post_init) {
            cb(self)?;
        }
        info!(
            site = %self.name,
            dbs = self.dbs.len(),
            storages = self.storages.len(),
            "site initialized"
        );
        Ok(())
    }

    /// `init`, panicking on failure.
    pub fn init_or_panic(&mut self) {
        if let Err(e) = self.init() {
            panic!("init site {:?}: {e}", self.name);
        }
    }

    fn init_storages(&mut self, root: &Path) -> Result<(), SiteError> {
        self.storages.clear();
        for (name, config) in &self.config.storage {
            let store = self
                .options
                .storages
                .open(name, config, root)
                .map_err(|e| {
                    SiteError::Storage(format!(
                        "open storage {name:?} for site {:?} failed: {e}",
                        self.name
                    ))
                })?;
            debug!(site = %self.name, storage = %name, kind = config.kind(), "storage opened");
            if self.storages.is_empty() && !self.config.storage.contains_key(DEFAULT_STORAGE) {
                self.storages.insert(DEFAULT_STORAGE.to_string(), store.clone());
            }
            self.storages.insert(name.clone(), store);
        }

        let system = FileStore::open(root, &format!("{}/{SYSTEM_STORAGE}", self.config.public_path()))
            .map_err(|e| {
                SiteError::Storage(format!(
                    "open storage {SYSTEM_STORAGE:?} for site {:?} failed: {e}",
                    self.name
                ))
            })?;
        self.storages.insert(SYSTEM_STORAGE.to_string(), Arc::new(system));
        Ok(())
    }

    fn init_dbs(&mut self) -> Result<(), SiteError> {
        self.dbs.clear();
        for (key, config) in &self.config.db {
            let factories = self.options.adapters.clone();
            let opener: AdapterOpener = Arc::new(move |c: &DbConfig| factories.open(c));
            let raw = self
                .options
                .adapters
                .raw_opener(config)
                .map(|o| RawDb::new(config.clone(), o));
            let db = Arc::new(Db::new(key, &self.name, config.clone(), opener, raw));
            if self.options.db_auto_connect {
                db.open()?;
            }
            self.dbs.insert(key.clone(), db);
        }
        Ok(())
    }

    // ── DBs ──

    pub fn get_db(&self, name: &str) -> Option<Arc<Db>> {
        self.dbs.get(name).cloned()
    }

    pub fn get_system_db(&self) -> Option<Arc<Db>> {
        self.get_db(SYSTEM_DB)
    }

    /// The named DB, or the system DB when the name is empty or unknown.
    pub fn get_db_or_system(&self, name: &str) -> Option<Arc<Db>> {
        self.get_db(name).or_else(|| self.get_system_db())
    }

    /// Visit DBs in config order until `f` breaks.
    pub fn each_db<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Arc<Db>) -> ControlFlow<()>,
    {
        for (key, db) in &self.dbs {
            if f(key, db).is_break() {
                break;
            }
        }
    }

    // ── Storages ──

    pub fn storage(&self, name: &str) -> Option<Arc<dyn BlobStore>> {
        self.storages.get(name).cloned()
    }

    /// The first configured storage, or the system storage when none is.
    pub fn default_storage(&self) -> Option<Arc<dyn BlobStore>> {
        self.storage(DEFAULT_STORAGE).or_else(|| self.system_storage())
    }

    pub fn system_storage(&self) -> Option<Arc<dyn BlobStore>> {
        self.storage(SYSTEM_STORAGE)
    }

    pub fn storage_or_default(&self, name: &str) -> Option<Arc<dyn BlobStore>> {
        if name.is_empty() {
            return self.default_storage();
        }
        self.storage(name).or_else(|| self.default_storage())
    }

    pub fn storage_names(&self) -> Vec<&str> {
        self.storages.keys().map(|k| k.as_str()).collect()
    }

    // ── URLs ──

    /// Public URL joined with `parts`.
    pub fn public_url(&self, parts: &[&str]) -> String {
        join_parts(&self.config.public_url, parts)
    }

    pub fn static_url(&self, parts: &[&str]) -> String {
        let base = if self.config.static_url.is_empty() {
            &self.config.public_url
        } else {
            &self.config.static_url
        };
        join_parts(base, parts)
    }

    // ── Runtime config ──

    /// Runtime setting, falling back to the static `extra` table.
    pub fn config_value(&self, key: &str) -> Option<Value> {
        if let Some(getter) = self.config_getter.get() {
            match getter.get(&self.name, key) {
                Ok(Some(v)) => return Some(v),
                Ok(None) => {}
                Err(e) => warn!(site = %self.name, key, error = %e, "reading runtime config"),
            }
        }
        self.config.extra.get(key).cloned()
    }

    pub fn set_config(&self, key: &str, value: &Value) -> Result<(), SiteError> {
        self.config_setter
            .get()
            .ok_or_else(|| SiteError::Config(format!("site {:?} is not registered", self.name)))?
            .set(key, value)
    }

    pub fn delete_config(&self, key: &str) -> Result<(), SiteError> {
        self.config_setter
            .get()
            .ok_or_else(|| SiteError::Config(format!("site {:?} is not registered", self.name)))?
            .delete(key)
    }

    // ── Registration ──

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Wire registry collaborators. A site keeps the first ones it was given.
    pub(crate) fn register(&self, getter: Arc<dyn ConfigGetter>, setter: Arc<dyn ConfigSetter>) {
        let _ = self.config_getter.set(getter);
        let _ = self.config_setter.set(setter);
        let _ = self.span.set(tracing::info_span!("site", name = %self.name));
        self.registered.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_unregistered(&self) {
        self.registered.store(false, Ordering::SeqCst);
    }

    /// Span wrapping site-scoped work; disabled until registration.
    pub fn span(&self) -> tracing::Span {
        self.span.get().cloned().unwrap_or_else(tracing::Span::none)
    }

    /// Register a callback run when the site is destroyed.
    pub fn on_destroy(&self, cb: SiteCallback) {
        match self.on_destroy.lock() {
            Ok(mut cbs) => cbs.push(cb),
            Err(e) => warn!(site = %self.name, error = %e, "on_destroy lock poisoned"),
        }
    }

    /// Run on-destroy callbacks in registration order, then close DBs.
    pub(crate) fn destroy(&self) {
        let _enter = self.span().entered();
        let callbacks = match self.on_destroy.lock() {
            Ok(mut cbs) => std::mem::take(&mut *cbs),
            Err(_) => Vec::new(),
        };
        for cb in callbacks {
            if let Err(e) = cb(self) {
                warn!(site = %self.name, error = %e, "on-destroy callback failed");
            }
        }
        for (key, db) in &self.dbs {
            if let Err(e) = db.close() {
                warn!(site = %self.name, db = %key, error = %e, "closing DB");
            }
        }
        self.set_unregistered();
    }

    // ── Contexts ──

    /// Top context bound to this site and its system DB.
    pub fn new_context(self: &Arc<Self>) -> Context {
        Context::new_top(None).with_site(self.clone())
    }
}

impl std::fmt::Debug for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Site")
            .field("name", &self.name)
            .field("registered", &self.is_registered())
            .field("dbs", &self.dbs.keys().collect::<Vec<_>>())
            .field("storages", &self.storages.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn join_parts(base: &str, parts: &[&str]) -> String {
    let mut out = base.trim_end_matches('/').to_string();
    for p in parts {
        let p = p.trim_matches('/');
        if !p.is_empty() {
            out.push('/');
            out.push_str(p);
        }
    }
    out
}
