//! Site registry.
//!
//! Owns every site of the process and indexes them by name, host and URL
//! path. One reader/writer lock serializes membership changes; lookups
//! take the read lock.
//!
//! Observers run while the write lock is held (except `PostAdded`, which
//! runs after it is released) and must not call back into the registry.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{info, warn};

use crate::config::SYSTEM_DB;
use crate::config_store::{ConfigGetter, ConfigSetterFactory, MemoryConfigStore};
use crate::error::SiteError;
use crate::site::Site;

/// Observer of site membership.
pub type SiteObserver = Arc<dyn Fn(&Arc<Site>) + Send + Sync>;

/// Observer of a host or path binding.
pub type BindingObserver = Arc<dyn Fn(&Arc<Site>, &str) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    added: Vec<SiteObserver>,
    post_added: Vec<SiteObserver>,
    deleted: Vec<SiteObserver>,
    host_added: Vec<BindingObserver>,
    host_deleted: Vec<BindingObserver>,
    path_added: Vec<BindingObserver>,
    path_deleted: Vec<BindingObserver>,
}

#[derive(Default)]
struct Inner {
    by_name: HashMap<String, Arc<Site>>,
    by_host: HashMap<String, Arc<Site>>,
    by_path: HashMap<String, Arc<Site>>,
    callbacks: Callbacks,
}

impl Inner {
    fn fire_host_deleted(&self, site: &Arc<Site>, host: &str) {
        for cb in &self.callbacks.host_deleted {
            cb(site, host);
        }
    }

    fn fire_path_deleted(&self, site: &Arc<Site>, path: &str) {
        for cb in &self.callbacks.path_deleted {
            cb(site, path);
        }
    }

    /// Remove the site's host and path bindings, firing their observers.
    /// Returns the removed hosts and paths.
    fn unbind(&mut self, site: &Arc<Site>) -> (Vec<String>, Vec<String>) {
        let mut hosts: Vec<String> = self
            .by_host
            .iter()
            .filter(|(_, s)| Arc::ptr_eq(s, site))
            .map(|(h, _)| h.clone())
            .collect();
        hosts.sort();
        for h in &hosts {
            self.by_host.remove(h);
            self.fire_host_deleted(site, h);
        }

        let mut paths: Vec<String> = self
            .by_path
            .iter()
            .filter(|(_, s)| Arc::ptr_eq(s, site))
            .map(|(p, _)| p.clone())
            .collect();
        paths.sort();
        for p in &paths {
            self.by_path.remove(p);
            self.fire_path_deleted(site, p);
        }
        (hosts, paths)
    }

    fn bind_host(&mut self, site: &Arc<Site>, host: &str) {
        self.by_host.insert(host.to_string(), site.clone());
        for cb in &self.callbacks.host_added {
            cb(site, host);
        }
    }

    fn bind_path(&mut self, site: &Arc<Site>, path: &str) {
        self.by_path.insert(path.to_string(), site.clone());
        for cb in &self.callbacks.path_added {
            cb(site, path);
        }
    }

    fn fire_deleted(&self, site: &Arc<Site>) {
        for cb in &self.callbacks.deleted {
            cb(site);
        }
    }
}

/// Normalize a mount path to `/segment`; `/` stays `/`.
fn normalize_path(path: &str) -> String {
    let p = path.trim_matches('/');
    format!("/{p}")
}

pub struct SiteRegistry {
    alone: bool,
    config_getter: Arc<dyn ConfigGetter>,
    setter_factory: Arc<dyn ConfigSetterFactory>,
    inner: RwLock<Inner>,
}

impl Default for SiteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteRegistry {
    /// Registry with in-memory runtime config.
    pub fn new() -> Self {
        let store = MemoryConfigStore::new();
        Self::with_config_store(Arc::new(store.clone()), Arc::new(store))
    }

    pub fn with_config_store(
        getter: Arc<dyn ConfigGetter>,
        setter_factory: Arc<dyn ConfigSetterFactory>,
    ) -> Self {
        Self {
            alone: false,
            config_getter: getter,
            setter_factory,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Allow a single site only.
    pub fn alone(mut self) -> Self {
        self.alone = true;
        self
    }

    pub fn is_alone(&self) -> bool {
        self.alone
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    // ── Observers ──

    /// Observe added sites. The callback is replayed over current sites.
    pub fn on_add(&self, cb: SiteObserver) {
        let mut inner = self.write();
        let mut sites: Vec<&Arc<Site>> = inner.by_name.values().collect();
        sites.sort_by(|a, b| a.name().cmp(b.name()));
        for site in sites {
            cb(site);
        }
        inner.callbacks.added.push(cb);
    }

    /// Observe added sites after the registry lock is released.
    pub fn on_post_add(&self, cb: SiteObserver) {
        self.write().callbacks.post_added.push(cb);
    }

    pub fn on_delete(&self, cb: SiteObserver) {
        self.write().callbacks.deleted.push(cb);
    }

    /// Observe host bindings. The callback is replayed over current ones.
    pub fn on_host_add(&self, cb: BindingObserver) {
        let mut inner = self.write();
        let mut hosts: Vec<(&String, &Arc<Site>)> = inner.by_host.iter().collect();
        hosts.sort_by(|a, b| a.0.cmp(b.0));
        for (host, site) in hosts {
            cb(site, host);
        }
        inner.callbacks.host_added.push(cb);
    }

    pub fn on_host_delete(&self, cb: BindingObserver) {
        self.write().callbacks.host_deleted.push(cb);
    }

    /// Observe path bindings. The callback is replayed over current ones.
    pub fn on_path_add(&self, cb: BindingObserver) {
        let mut inner = self.write();
        let mut paths: Vec<(&String, &Arc<Site>)> = inner.by_path.iter().collect();
        paths.sort_by(|a, b| a.0.cmp(b.0));
        for (path, site) in paths {
            cb(site, path);
        }
        inner.callbacks.path_added.push(cb);
    }

    pub fn on_path_delete(&self, cb: BindingObserver) {
        self.write().callbacks.path_deleted.push(cb);
    }

    // ── Membership ──

    /// Register a site.
    pub fn add(&self, site: Arc<Site>) -> Result<(), SiteError> {
        let post_added = {
            let mut inner = self.write();
            if self.alone && !inner.by_name.is_empty() {
                return Err(SiteError::AloneViolation(site.name().to_string()));
            }
            if inner.by_name.contains_key(site.name()) {
                return Err(SiteError::AlreadyRegistered(site.name().to_string()));
            }
            if !site.config().db.contains_key(SYSTEM_DB) {
                return Err(SiteError::MissingSystemDb(site.name().to_string()));
            }

            if !site.is_registered() {
                site.register(self.config_getter.clone(), self.setter_factory.setter(site.name()));
            }
            inner.by_name.insert(site.name().to_string(), site.clone());
            for cb in &inner.callbacks.added {
                cb(&site);
            }
            inner.callbacks.post_added.clone()
        };

        info!(site = %site.name(), "site added");
        for cb in &post_added {
            cb(&site);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<Site>, SiteError> {
        self.read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| SiteError::NotFound(name.to_string()))
    }

    pub fn get_by_host(&self, host: &str) -> Result<Arc<Site>, SiteError> {
        self.read()
            .by_host
            .get(host)
            .cloned()
            .ok_or_else(|| SiteError::HostNotFound(host.to_string()))
    }

    pub fn get_by_path(&self, path: &str) -> Result<Arc<Site>, SiteError> {
        let path = normalize_path(path);
        self.read()
            .by_path
            .get(&path)
            .cloned()
            .ok_or(SiteError::PathNotFound(path))
    }

    /// Site bound to the longest path that prefixes `request_path`, with
    /// the matched mount path.
    pub fn match_path(&self, request_path: &str) -> Option<(Arc<Site>, String)> {
        let inner = self.read();
        inner
            .by_path
            .iter()
            .filter(|(p, _)| {
                p.as_str() == "/"
                    || request_path == p.as_str()
                    || request_path
                        .strip_prefix(p.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|(p, _)| p.len())
            .map(|(p, s)| (s.clone(), p.clone()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.read().by_name.contains_key(name)
    }

    pub fn has_sites(&self) -> bool {
        !self.read().by_name.is_empty()
    }

    pub fn len(&self) -> usize {
        self.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_sites()
    }

    /// The only site, in alone mode.
    pub fn site(&self) -> Option<Arc<Site>> {
        let inner = self.read();
        if inner.by_name.len() == 1 {
            inner.by_name.values().next().cloned()
        } else {
            None
        }
    }

    pub fn add_host(&self, name: &str, host: &str) -> Result<(), SiteError> {
        let mut inner = self.write();
        if inner.by_host.contains_key(host) {
            return Err(SiteError::DuplicateHost(host.to_string()));
        }
        let site = inner
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| SiteError::NotFound(name.to_string()))?;
        inner.bind_host(&site, host);
        Ok(())
    }

    pub fn del_host(&self, host: &str) -> Result<(), SiteError> {
        let mut inner = self.write();
        let site = inner
            .by_host
            .remove(host)
            .ok_or_else(|| SiteError::HostNotFound(host.to_string()))?;
        inner.fire_host_deleted(&site, host);
        Ok(())
    }

    pub fn add_path(&self, name: &str, path: &str) -> Result<(), SiteError> {
        let path = normalize_path(path);
        let mut inner = self.write();
        if inner.by_path.contains_key(&path) {
            return Err(SiteError::DuplicatePath(path));
        }
        let site = inner
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| SiteError::NotFound(name.to_string()))?;
        inner.bind_path(&site, &path);
        Ok(())
    }

    pub fn del_path(&self, path: &str) -> Result<(), SiteError> {
        let path = normalize_path(path);
        let mut inner = self.write();
        let site = inner
            .by_path
            .remove(&path)
            .ok_or_else(|| SiteError::PathNotFound(path.clone()))?;
        inner.fire_path_deleted(&site, &path);
        Ok(())
    }

    /// Move a site to another key. The site keeps its own name; host and
    /// path bindings follow it.
    pub fn rename(&self, old: &str, new: &str) -> Result<(), SiteError> {
        let mut inner = self.write();
        if inner.by_name.contains_key(new) {
            return Err(SiteError::AlreadyRegistered(new.to_string()));
        }
        let site = inner
            .by_name
            .remove(old)
            .ok_or_else(|| SiteError::NotFound(old.to_string()))?;
        inner.by_name.insert(new.to_string(), site);
        Ok(())
    }

    /// Remove sites and their bindings, run their on-destroy callbacks and
    /// close their DBs. Stops at the first unknown name.
    pub fn destroy_site(&self, names: &[&str]) -> Result<(), SiteError> {
        let mut inner = self.write();
        for name in names {
            let site = inner
                .by_name
                .remove(*name)
                .ok_or_else(|| SiteError::NotFound(name.to_string()))?;
            inner.unbind(&site);
            site.destroy();
            inner.fire_deleted(&site);
            info!(site = %name, "site destroyed");
        }
        Ok(())
    }

    /// Destroy every site.
    pub fn destroy_all(&self) -> Result<(), SiteError> {
        let mut names: Vec<String> = self.read().by_name.keys().cloned().collect();
        names.sort();
        let refs: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        self.destroy_site(&refs)
    }

    /// Run `f` with only `name` registered.
    ///
    /// Every other site is unregistered with its bindings (observers fire,
    /// on-destroy callbacks do not), `f` runs, then the sites are restored
    /// in name order. An error from `f` skips the restore; those sites stay
    /// out of the registry.
    pub fn only<F>(&self, name: &str, f: F) -> Result<(), SiteError>
    where
        F: FnOnce(&Arc<Site>) -> Result<(), SiteError>,
    {
        let (site, removed) = {
            let mut inner = self.write();
            let site = inner
                .by_name
                .get(name)
                .cloned()
                .ok_or_else(|| SiteError::NotFound(name.to_string()))?;

            let mut others: Vec<String> = inner
                .by_name
                .keys()
                .filter(|k| k.as_str() != name)
                .cloned()
                .collect();
            others.sort();

            let mut removed = Vec::with_capacity(others.len());
            for key in others {
                if let Some(other) = inner.by_name.remove(&key) {
                    let (hosts, paths) = inner.unbind(&other);
                    inner.fire_deleted(&other);
                    removed.push((key, other, hosts, paths));
                }
            }
            (site, removed)
        };

        if let Err(e) = f(&site) {
            warn!(
                site = %name,
                removed = removed.len(),
                error = %e,
                "only: callback failed, other sites not restored"
            );
            return Err(e);
        }

        let mut inner = self.write();
        for (key, other, hosts, paths) in removed {
            inner.by_name.insert(key, other.clone());
            for cb in &inner.callbacks.added {
                cb(&other);
            }
            for h in &hosts {
                inner.bind_host(&other, h);
            }
            for p in &paths {
                inner.bind_path(&other, p);
            }
        }
        Ok(())
    }

    // ── Iteration ──

    /// Sites ordered by name.
    pub fn sorted(&self) -> Vec<Arc<Site>> {
        let inner = self.read();
        let mut sites: Vec<Arc<Site>> = inner.by_name.values().cloned().collect();
        sites.sort_by(|a, b| a.name().cmp(b.name()));
        sites
    }

    /// Visit sites in name order until `f` breaks.
    pub fn each<F>(&self, mut f: F) -> Result<(), SiteError>
    where
        F: FnMut(&Arc<Site>) -> Result<ControlFlow<()>, SiteError>,
    {
        for site in self.sorted() {
            if f(&site)?.is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Visit the named sites, or every site when `names` is empty or holds
    /// `""` or `"*"`.
    pub fn each_or_all<F>(&self, names: &[&str], mut f: F) -> Result<(), SiteError>
    where
        F: FnMut(&Arc<Site>) -> Result<ControlFlow<()>, SiteError>,
    {
        if names.is_empty() || names.iter().any(|n| n.is_empty() || *n == "*") {
            return self.each(f);
        }
        let sites = names
            .iter()
            .map(|n| self.get(n))
            .collect::<Result<Vec<_>, _>>()?;
        for site in &sites {
            if f(site)?.is_break() {
                break;
            }
        }
        Ok(())
    }

    pub fn hosts_of(&self, name: &str) -> Vec<String> {
        let inner = self.read();
        let Some(site) = inner.by_name.get(name) else {
            return Vec::new();
        };
        let mut hosts: Vec<String> = inner
            .by_host
            .iter()
            .filter(|(_, s)| Arc::ptr_eq(s, site))
            .map(|(h, _)| h.clone())
            .collect();
        hosts.sort();
        hosts
    }

    pub fn paths_of(&self, name: &str) -> Vec<String> {
        let inner = self.read();
        let Some(site) = inner.by_name.get(name) else {
            return Vec::new();
        };
        let mut paths: Vec<String> = inner
            .by_path
            .iter()
            .filter(|(_, s)| Arc::ptr_eq(s, site))
            .map(|(p, _)| p.clone())
            .collect();
        paths.sort();
        paths
    }
}
