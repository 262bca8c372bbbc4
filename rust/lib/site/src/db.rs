//! Site database handle.
//!
//! A [`Db`] pairs a configured connection with the site that owns it.
//! The query handle is opened once; the raw subprocess handle (when the
//! adapter has one) opens lazily on first use.

use std::sync::{Arc, RwLock};

use openerp_sql::{AdapterOpener, DbConfig, RawDb, SQLError, SQLStore};
use tracing::{debug, info};

use crate::error::SiteError;

/// Callback run after a DB is opened.
pub type DbInitCallback = Arc<dyn Fn(&Db) -> Result<(), SiteError> + Send + Sync>;

pub struct Db {
    key: String,
    site: String,
    config: DbConfig,
    opener: AdapterOpener,
    store: RwLock<Option<Arc<dyn SQLStore>>>,
    raw: Option<RawDb>,
    init_callbacks: RwLock<Vec<DbInitCallback>>,
}

impl Db {
    pub fn new(
        key: &str,
        site: &str,
        config: DbConfig,
        opener: AdapterOpener,
        raw: Option<RawDb>,
    ) -> Self {
        Self {
            key: key.to_string(),
            site: site.to_string(),
            config,
            opener,
            store: RwLock::new(None),
            raw,
            init_callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Key of this DB in the site config (`system`, `shop`, ...).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name of the owning site.
    pub fn site_name(&self) -> &str {
        &self.site
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    fn failed(&self, action: &str, e: impl std::fmt::Display) -> SiteError {
        SiteError::Db(format!(
            "{action} DB {:?} for site {:?} failed: {e}",
            self.key, self.site
        ))
    }

    /// Register a callback run after every successful open.
    pub fn on_init(&self, cb: DbInitCallback) {
        if let Ok(mut cbs) = self.init_callbacks.write() {
            cbs.push(cb);
        }
    }

    /// Open the query handle. Fails if it is already open.
    pub fn open(&self) -> Result<(), SiteError> {
        {
            let mut guard = self.store.write().map_err(|e| self.failed("open", e))?;
            if guard.is_some() {
                return Err(self.failed("open", "already open"));
            }
            if self.config.is_sqlite() {
                if let Some(parent) = std::path::Path::new(&self.config.name).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| self.failed("open", e))?;
                    }
                }
            }
            let store = (self.opener)(&self.config).map_err(|e| self.failed("open", e))?;
            *guard = Some(store);
        }
        info!(site = %self.site, db = %self.key, adapter = self.config.adapter(), "DB opened");

        let callbacks = self
            .init_callbacks
            .read()
            .map(|c| c.clone())
            .unwrap_or_default();
        for cb in callbacks {
            cb(self)?;
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.store.read().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Query handle. Fails when the DB is closed.
    pub fn store(&self) -> Result<Arc<dyn SQLStore>, SiteError> {
        let guard = self.store.read().map_err(|e| self.failed("read", e))?;
        guard
            .clone()
            .ok_or_else(|| self.failed("read", "not open"))
    }

    /// Close both the query and raw handles. Idempotent.
    pub fn close(&self) -> Result<(), SiteError> {
        let was_open = self
            .store
            .write()
            .map_err(|e| self.failed("close", e))?
            .take()
            .is_some();
        if let Some(raw) = &self.raw {
            raw.close().map_err(|e| self.failed("close", e))?;
        }
        if was_open {
            debug!(site = %self.site, db = %self.key, "DB closed");
        }
        Ok(())
    }

    pub fn reopen(&self) -> Result<(), SiteError> {
        self.close()?;
        self.open()
    }

    /// Raw subprocess handle, when the adapter provides one.
    pub fn raw(&self) -> Option<&RawDb> {
        self.raw.as_ref()
    }

    /// Run a script through the raw handle.
    pub fn raw_execute(&self, script: &str) -> Result<(), SiteError> {
        let raw = self
            .raw
            .as_ref()
            .ok_or_else(|| self.failed("raw", SQLError::Raw("no raw adapter".into())))?;
        raw.do_with(|conn| conn.execute(script))
            .map_err(|e| self.failed("raw", e))
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("key", &self.key)
            .field("site", &self.site)
            .field("adapter", &self.config.adapter())
            .field("open", &self.is_open())
            .finish()
    }
}
