//! The real-state registry.
//!
//! [`SafeRealState`] maps application names to [`SafeApp`]s, and each
//! `SafeApp` maps [`ContainerKey`]s to the containers last reported for
//! that application. Every level has its own reader/writer lock; no lock
//! of one level is held while the other level's lock is taken.
//!
//! Each `SafeApp` carries a dirty bit telling the router sync whether its
//! routes must be republished. Readers check it, publish, then clear it.
//! A change landing between the check and the clear is lost until the
//! next change or full reconciliation; an extra republish is harmless.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;

use crate::model::{Container, ContainerKey, NodeRequest};

#[derive(Debug)]
struct AppInner {
    containers: HashMap<ContainerKey, Container>,
    to_update: bool,
}

/// All known instances of one application.
#[derive(Debug)]
pub struct SafeApp {
    inner: RwLock<AppInner>,
}

impl SafeApp {
    /// Creates an empty app with the dirty bit set, so the first sync
    /// clears whatever routes were published for this name before.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(AppInner {
                containers: HashMap::new(),
                to_update: true,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AppInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AppInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or replaces a container. Containers without ports are ignored.
    ///
    /// Only a new key or a changed primary port marks the app dirty; status,
    /// image and timestamp refreshes are stored silently.
    pub fn add_container(&self, c: Container) {
        let Some(port) = c.primary_port() else {
            return;
        };
        let key = c.key();

        let mut inner = self.write();
        let unchanged = inner
            .containers
            .get(&key)
            .is_some_and(|old| old.primary_port() == Some(port));
        if !unchanged {
            inner.to_update = true;
        }
        inner.containers.insert(key, c);
    }

    pub fn container_count(&self) -> usize {
        self.read().containers.len()
    }

    /// Returns every instance when any of them is not on `new_image`.
    ///
    /// An empty app counts as out of date and yields `Some(vec![])`. The
    /// returned list holds all instances, including those already running
    /// `new_image`.
    pub fn is_old_version(&self, new_image: &str) -> Option<Vec<Container>> {
        let inner = self.read();
        let is_old = inner.containers.is_empty()
            || inner.containers.values().any(|c| c.image != new_image);
        if is_old {
            Some(inner.containers.values().cloned().collect())
        } else {
            None
        }
    }

    pub fn containers(&self) -> Vec<Container> {
        self.read().containers.values().cloned().collect()
    }

    pub fn is_need_update_router(&self) -> bool {
        self.read().to_update
    }

    pub fn need_update_router(&self, need_update: bool) {
        self.write().to_update = need_update;
    }

    pub fn container_exists(&self, c: &Container) -> bool {
        self.read().containers.contains_key(&c.key())
    }

    /// Removes every instance on host `ip`. Returns how many were removed.
    pub fn delete_by_ip(&self, ip: &str) -> usize {
        self.delete_where(|c| c.ip == ip)
    }

    /// Removes every instance last seen strictly before `before`.
    /// Returns how many were removed.
    pub fn delete_stale(&self, before: i64) -> usize {
        self.delete_where(|c| c.update_at < before)
    }

    // Keys are collected under the read lock and removed under a short
    // write lock. An entry that starts matching after the scan survives
    // until the next sweep.
    fn delete_where<F>(&self, pred: F) -> usize
    where
        F: Fn(&Container) -> bool,
    {
        let doomed: Vec<ContainerKey> = {
            let inner = self.read();
            inner
                .containers
                .iter()
                .filter(|(_, c)| pred(c))
                .map(|(k, _)| k.clone())
                .collect()
        };
        if doomed.is_empty() {
            return 0;
        }

        let mut inner = self.write();
        let mut removed = 0;
        for key in &doomed {
            if inner.containers.remove(key).is_some() {
                removed += 1;
            }
        }
        inner.to_update = true;
        removed
    }

    /// Removes a container by key and marks the app dirty, even if the
    /// container was not present.
    pub fn delete_container(&self, c: &Container) {
        let key = c.key();
        let mut inner = self.write();
        inner.containers.remove(&key);
        inner.to_update = true;
    }

    pub fn has_relation(&self, ip: &str) -> bool {
        self.read().containers.values().any(|c| c.ip == ip)
    }
}

impl Default for SafeApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory of every application's [`SafeApp`], keyed by app name.
#[derive(Debug, Default)]
pub struct SafeRealState {
    apps: RwLock<HashMap<String, Arc<SafeApp>>>,
}

impl SafeRealState {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<SafeApp>>> {
        self.apps.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<SafeApp>>> {
        self.apps.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a container under its application, creating the app on
    /// first sight.
    ///
    /// Creation happens under the directory write lock, so concurrent
    /// first reports of one app all land in the same `SafeApp`. The
    /// directory lock is released before the app's own lock is taken.
    pub fn update_container(&self, c: Container) {
        let app = match self.get_safe_app(&c.app_name) {
            Some(app) => app,
            None => {
                let mut apps = self.write();
                let app = apps
                    .entry(c.app_name.clone())
                    .or_insert_with(|| Arc::new(SafeApp::new()));
                Arc::clone(app)
            }
        };
        app.add_container(c);
    }

    /// Merges one host's report, stamping each container with the host's
    /// address and observation time. Returns how many containers are
    /// tracked from it; portless ones are not.
    pub fn apply_report(&self, req: &NodeRequest) -> usize {
        let mut tracked = 0;
        for dto in &req.containers {
            if !dto.ports.is_empty() {
                tracked += 1;
            }
            let c = Container::from_dto(dto.clone(), req.node.ip.clone(), req.node.update_at);
            self.update_container(c);
        }
        tracked
    }

    pub fn add_safe_app(&self, name: impl Into<String>, app: SafeApp) {
        self.write().insert(name.into(), Arc::new(app));
    }

    pub fn get_safe_app(&self, name: &str) -> Option<Arc<SafeApp>> {
        self.read().get(name).cloned()
    }

    pub fn delete_safe_app(&self, name: &str) {
        self.write().remove(name);
    }

    pub fn real_app_exists(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    fn snapshot(&self) -> Vec<(String, Arc<SafeApp>)> {
        self.read()
            .iter()
            .map(|(name, app)| (name.clone(), Arc::clone(app)))
            .collect()
    }

    /// Purges every instance hosted on `ip`, across all applications.
    pub fn delete_by_ip(&self, ip: &str) -> usize {
        let mut total = 0;
        for (name, app) in self.snapshot() {
            let removed = app.delete_by_ip(ip);
            if removed > 0 {
                debug!("Removed {} containers of {} on {}", removed, name, ip);
            }
            total += removed;
        }
        total
    }

    /// Drops every instance last seen before `before`, across all applications.
    pub fn delete_stale(&self, before: i64) -> usize {
        let mut total = 0;
        for (name, app) in self.snapshot() {
            let removed = app.delete_stale(before);
            if removed > 0 {
                debug!("Expired {} stale containers of {}", removed, name);
            }
            total += removed;
        }
        total
    }

    pub fn has_relation(&self, app_name: &str, ip: &str) -> bool {
        self.get_safe_app(app_name)
            .is_some_and(|app| app.has_relation(ip))
    }
}
