//! Version Resolver
//!
//! Finds the latest released version of a dependency. Results are memoized
//! per package identity for the lifetime of a [`ResolverContext`], and
//! concurrent lookups for the same package are serialized so each package
//! costs at most one outbound request.
//!
//! Resolution order:
//! 1. Skip unversioned dependencies and version ranges
//! 2. Take the per-package lock
//! 3. Consult the cache
//! 4. Ask the registry for the scheme, then record a terminal cache entry

pub mod registry;

pub use registry::{
    JsrRegistry, NoopRegistry, NpmRegistry, RedirectRegistry, Registry, RegistryEndpoints,
    RegistryTable, default_table,
};

use crate::specifier::Dependency;
use crate::{Error, Result, version};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Terminal state of a package in the resolver cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    /// The registry offered this release
    Latest(String),
    /// The registry offered nothing usable (missing or prerelease)
    NoUpdate,
    /// The registry lookup failed
    Failed(String),
}

/// A dependency together with its newer replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedDependency {
    pub from: Dependency,
    pub to: Dependency,
}

impl UpdatedDependency {
    /// The version being replaced
    pub fn from_version(&self) -> Option<&str> {
        self.from.version.as_deref()
    }

    /// The version being introduced
    pub fn to_version(&self) -> Option<&str> {
        self.to.version.as_deref()
    }
}

/// Owns the resolver cache and the per-package locks
pub struct ResolverContext {
    registries: RegistryTable,
    cache: Mutex<HashMap<String, CacheEntry>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ResolverContext {
    /// Create a context backed by a registry table
    pub fn new(registries: RegistryTable) -> Self {
        Self {
            registries,
            cache: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a context with the built-in registries
    pub fn with_endpoints(endpoints: &RegistryEndpoints) -> Result<Self> {
        Ok(Self::new(default_table(endpoints)?))
    }

    /// Look up the cache entry for a package identity (`scheme:name`)
    pub fn cached(&self, identity: &str) -> Option<CacheEntry> {
        self.cache().get(identity).cloned()
    }

    /// Resolve the latest version of a dependency
    ///
    /// Returns `None` when the dependency is unversioned, pinned to a range,
    /// or already up to date.
    pub async fn resolve_latest(
        &self,
        dependency: &Dependency,
    ) -> Result<Option<UpdatedDependency>> {
        let Some(current) = dependency.version.as_deref() else {
            return Ok(None);
        };
        if version::is_range(current) {
            tracing::debug!("Skipping {}: {} is a range", dependency.name, current);
            return Ok(None);
        }

        let identity = dependency.identity();
        let lock = self.lock_for(&identity);
        let _guard = lock.lock().await;

        let entry = match self.cached(&identity) {
            Some(entry) => {
                tracing::debug!("Cache hit for {}: {:?}", identity, entry);
                entry
            }
            None => {
                let entry = self.fetch(dependency).await;
                self.cache().insert(identity, entry.clone());
                entry
            }
        };

        match entry {
            CacheEntry::Latest(latest) if version::is_newer(&latest, current) => {
                Ok(Some(UpdatedDependency {
                    from: dependency.clone(),
                    to: dependency.with_version(latest),
                }))
            }
            CacheEntry::Latest(_) | CacheEntry::NoUpdate => Ok(None),
            CacheEntry::Failed(message) => Err(Error::Resolution {
                name: dependency.name.clone(),
                message,
            }),
        }
    }

    async fn fetch(&self, dependency: &Dependency) -> CacheEntry {
        let registry = self.registries.find(&dependency.scheme);
        tracing::debug!(
            "Resolving {} via {} registry",
            dependency.name,
            registry.registry_name()
        );

        match registry.latest(dependency).await {
            Ok(Some(candidate)) if version::is_prerelease(&candidate) => {
                tracing::debug!("Ignoring prerelease {}@{}", dependency.name, candidate);
                CacheEntry::NoUpdate
            }
            Ok(Some(candidate)) => CacheEntry::Latest(candidate),
            Ok(None) => CacheEntry::NoUpdate,
            Err(e) => CacheEntry::Failed(e.to_string()),
        }
    }

    fn lock_for(&self, identity: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(identity.to_string()).or_default().clone()
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}
