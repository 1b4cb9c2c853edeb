//! Route modules and their cached matchers.
//!
//! # Responsibilities
//! - Keep route modules keyed by id, each mounted at a path prefix
//! - Pick the module owning a request path (longest prefix wins)
//! - Build a module's matcher from a fresh registry on first use and cache it
//!   with the module version
//!
//! # Design Decisions
//! - Every module owns its registry; nothing is reset process-wide
//! - Rebuild and cache swap happen under the module's own lock
//! - `reload` only bumps the version; the next lookup re-declares the routes
//! - Patterns inside a module are absolute paths; the prefix only selects
//!   the module

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::routing::matcher::CompiledMatcher;
use crate::routing::registry::RouteRegistry;
use crate::routing::RouteError;

/// Function that declares a module's routes.
pub type DeclareFn = Arc<dyn Fn(&mut RouteRegistry) -> Result<(), RouteError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A set of routes declared together and mounted at one prefix.
pub struct RouteModule {
    id: ModuleId,
    prefix: String,
    declare: DeclareFn,
    dir: Option<PathBuf>,
    version: AtomicU64,
    cache: Mutex<Option<(u64, Arc<CompiledMatcher>)>>,
}

impl RouteModule {
    pub fn new(id: impl Into<ModuleId>, prefix: &str, declare: DeclareFn) -> Self {
        Self {
            id: id.into(),
            prefix: normalize_prefix(prefix),
            declare,
            dir: None,
            version: AtomicU64::new(0),
            cache: Mutex::new(None),
        }
    }

    /// Directory used to resolve templates and files for this module.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    /// Mount prefix without a trailing slash; empty for the root.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn owns(&self, path: &str) -> bool {
        self.prefix.is_empty()
            || path == self.prefix
            || path
                .strip_prefix(&self.prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// The compiled matcher for the current module version.
    pub fn matcher(&self) -> Result<Arc<CompiledMatcher>, RouteError> {
        let mut cache = self.cache.lock();
        let version = self.version();
        if let Some((cached_version, matcher)) = cache.as_ref() {
            if *cached_version == version {
                return Ok(Arc::clone(matcher));
            }
        }

        let mut registry = RouteRegistry::new();
        (self.declare)(&mut registry)?;
        let matcher = Arc::new(registry.compile().with_module(self.id.clone()));
        tracing::debug!(
            module = %self.id,
            version,
            routes = registry.len(),
            "Route module compiled"
        );
        *cache = Some((version, Arc::clone(&matcher)));
        Ok(matcher)
    }

    fn bump(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl fmt::Debug for RouteModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteModule")
            .field("id", &self.id)
            .field("prefix", &self.prefix)
            .field("dir", &self.dir)
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// All route modules of an application.
#[derive(Debug, Default)]
pub struct Site {
    modules: DashMap<ModuleId, Arc<RouteModule>>,
}

impl Site {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount (or replace) a module declared by `declare`.
    pub fn mount<F>(&self, id: impl Into<ModuleId>, prefix: &str, declare: F) -> Arc<RouteModule>
    where
        F: Fn(&mut RouteRegistry) -> Result<(), RouteError> + Send + Sync + 'static,
    {
        self.mount_module(RouteModule::new(id, prefix, Arc::new(declare)))
    }

    pub fn mount_module(&self, module: RouteModule) -> Arc<RouteModule> {
        let module = Arc::new(module);
        tracing::info!(module = %module.id, prefix = %module.prefix, "Route module mounted");
        self.modules.insert(module.id.clone(), Arc::clone(&module));
        module
    }

    pub fn unmount(&self, id: &ModuleId) -> bool {
        self.modules.remove(id).is_some()
    }

    /// Invalidate a module's matcher; returns the new version.
    pub fn reload(&self, id: &ModuleId) -> Option<u64> {
        let module = self.module(id)?;
        let version = module.bump();
        tracing::info!(module = %id, version, "Route module reloaded");
        Some(version)
    }

    pub fn module(&self, id: &ModuleId) -> Option<Arc<RouteModule>> {
        self.modules.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// The module with the longest prefix owning `path`.
    pub fn resolve(&self, path: &str) -> Option<Arc<RouteModule>> {
        self.modules
            .iter()
            .filter(|entry| entry.value().owns(path))
            .max_by_key(|entry| entry.value().prefix.len())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Every mounted module, longest prefix first, then by id.
    pub fn modules(&self) -> Vec<Arc<RouteModule>> {
        let mut modules: Vec<_> = self
            .modules
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        modules.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
