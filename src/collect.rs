//! Update Collector
//!
//! Walks the module graph and turns every upgradable remote import into an
//! [`Update`]. Imports that are not versioned URLs themselves are looked up
//! in the import map, if one is configured, and the matched entry is recorded
//! so the patch lands in the map instead of the module.

use crate::Result;
use crate::graph::{Import, ModuleGraph};
use crate::import_map::ImportMapResolver;
use crate::resolver::ResolverContext;
use crate::specifier::Dependency;
use crate::update::{ImportMapIndirection, Update, VersionFact};
use futures::future::join_all;
use std::path::{Path, PathBuf};

/// Inputs of a collection run
pub struct CollectOptions<'a> {
    pub resolver: &'a ResolverContext,
    pub graph: &'a dyn ModuleGraph,
    pub import_map: Option<&'a dyn ImportMapResolver>,
    /// Skip packages whose name contains any of these
    pub ignore: Vec<String>,
    /// When non-empty, keep only packages whose name contains one of these
    pub only: Vec<String>,
}

impl<'a> CollectOptions<'a> {
    pub fn new(resolver: &'a ResolverContext, graph: &'a dyn ModuleGraph) -> Self {
        Self {
            resolver,
            graph,
            import_map: None,
            ignore: Vec::new(),
            only: Vec::new(),
        }
    }

    pub fn with_import_map(mut self, import_map: &'a dyn ImportMapResolver) -> Self {
        self.import_map = Some(import_map);
        self
    }

    pub fn with_ignore(mut self, ignore: Vec<String>) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_only(mut self, only: Vec<String>) -> Self {
        self.only = only;
        self
    }

    /// Whether the name filters let a package through
    pub fn accepts(&self, name: &str) -> bool {
        if self.ignore.iter().any(|pattern| name.contains(pattern.as_str())) {
            return false;
        }
        self.only.is_empty() || self.only.iter().any(|pattern| name.contains(pattern.as_str()))
    }

    /// Find the versioned dependency an import refers to
    fn locate(
        &self,
        referrer: &Path,
        specifier: &str,
    ) -> Option<(Dependency, Option<ImportMapIndirection>)> {
        if let Ok(dependency) = Dependency::parse(specifier) {
            if dependency.version.is_some() {
                return dependency.is_remote().then_some((dependency, None));
            }
        }

        let import_map = self.import_map?;
        let resolution = import_map.resolve(specifier, referrer)?;
        let dependency = Dependency::parse(&resolution.specifier).ok()?;
        if !dependency.is_remote() || dependency.version.is_none() {
            return None;
        }

        // The version has to come from the mapped value, or there is nothing
        // to patch in the map
        let mapped = Dependency::parse(&resolution.value).ok()?;
        if mapped.name != dependency.name || mapped.version != dependency.version {
            tracing::debug!(
                "Skipping {}: version not part of import map value {}",
                specifier,
                resolution.value
            );
            return None;
        }

        let indirection = ImportMapIndirection {
            location: import_map.location().to_path_buf(),
            key: resolution.key,
            value: resolution.value,
            scope: resolution.scope,
        };
        Some((dependency, Some(indirection)))
    }
}

/// Collect updates for every remote import reachable from the entry points
///
/// Resolution failures of individual dependencies are logged and skipped.
pub async fn collect(entrypoints: &[PathBuf], options: &CollectOptions<'_>) -> Result<Vec<Update>> {
    let modules = options.graph.modules(entrypoints).await?;

    let pending = modules.iter().flat_map(|module| {
        module
            .imports
            .iter()
            .map(move |import| collect_one(&module.path, import, options))
    });
    let updates: Vec<Update> = join_all(pending).await.into_iter().flatten().collect();

    tracing::info!(
        "Collected {} updates from {} modules",
        updates.len(),
        modules.len()
    );
    Ok(updates)
}

async fn collect_one(
    referrer: &Path,
    import: &Import,
    options: &CollectOptions<'_>,
) -> Option<Update> {
    let (dependency, map) = options.locate(referrer, &import.specifier)?;
    if !options.accepts(&dependency.name) {
        tracing::debug!("Filtered out {}", dependency.name);
        return None;
    }

    let updated = match options.resolver.resolve_latest(&dependency).await {
        Ok(Some(updated)) => updated,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("{} (imported by {})", e, referrer.display());
            return None;
        }
    };

    Some(Update {
        name: dependency.name.clone(),
        version: VersionFact {
            from: updated.from_version().map(str::to_string),
            to: updated.to_version()?.to_string(),
        },
        from: updated.from.to_uri(),
        to: updated.to.to_uri(),
        referrer: referrer.to_path_buf(),
        span: import.span,
        map,
    })
}
