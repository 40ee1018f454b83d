//! Updates - one record per upgradable import occurrence
//!
//! Several updates for the same package describe one logical upgrade seen at
//! several sites. [`reconcile`] folds them back into a single
//! [`VersionFact`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Half-open byte range `[start, end)` within a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// The reconciled version change of one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionFact {
    /// Prior version, absent when occurrences disagree
    pub from: Option<String>,
    pub to: String,
}

impl fmt::Display for VersionFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.from {
            Some(from) => write!(f, "{} → {}", from, self.to),
            None => write!(f, "→ {}", self.to),
        }
    }
}

/// An import resolved through an import map entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMapIndirection {
    /// The import map file
    pub location: PathBuf,
    /// Matched key, e.g. `std/`
    pub key: String,
    /// Matched value, e.g. `https://deno.land/std@0.200.0/`
    pub value: String,
    /// Scope key the entry sits under; `None` for top-level `imports`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// A single upgradable occurrence of a dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Package name
    pub name: String,
    pub version: VersionFact,
    /// Effective specifier before the update
    pub from: String,
    /// Effective specifier after the update
    pub to: String,
    /// Module containing the import
    pub referrer: PathBuf,
    /// Location of the specifier literal in the referrer
    pub span: Span,
    /// Set when the import goes through an import map
    pub map: Option<ImportMapIndirection>,
}

impl Update {
    /// The file whose text changes when this update is applied
    pub fn target(&self) -> &Path {
        match &self.map {
            Some(map) => &map.location,
            None => &self.referrer,
        }
    }
}

/// Fold same-package updates into a single version fact
///
/// - more than one package name: `Ok(None)`, partition first
/// - disagreement on the target: `ConflictingVersions`
/// - `from` survives only when every occurrence agrees on it
pub fn reconcile(updates: &[Update]) -> Result<Option<VersionFact>> {
    let Some(first) = updates.first() else {
        return Ok(None);
    };

    let names: BTreeSet<&str> = updates.iter().map(|u| u.name.as_str()).collect();
    if names.len() > 1 {
        return Ok(None);
    }

    let to = &first.version.to;
    if let Some(other) = updates.iter().find(|u| &u.version.to != to) {
        return Err(Error::ConflictingVersions {
            name: first.name.clone(),
            left: to.clone(),
            right: other.version.to.clone(),
        });
    }

    let from = &first.version.from;
    let from = if updates.iter().all(|u| &u.version.from == from) {
        from.clone()
    } else {
        None
    };

    Ok(Some(VersionFact {
        from,
        to: to.clone(),
    }))
}
