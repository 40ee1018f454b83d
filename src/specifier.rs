//! Dependency specifiers - versioned references embedded in import statements
//!
//! Format: `<scheme>:[//]<name>[@<version>][<path>]`
//!
//! Examples:
//! - `https://deno.land/std@0.200.0/version.ts`
//! - `npm:@octokit/rest@20.0.0`
//! - `jsr:@std/path@1.0.0/join`

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Schemes whose body is introduced by `//`.
const HIERARCHICAL_SCHEMES: &[&str] = &["http", "https", "file"];

/// A dependency parsed out of an import specifier.
///
/// `to_uri` is the exact inverse of `parse`, so a dependency can be
/// re-rendered with a different version without touching anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    /// URL scheme without the trailing colon (`https`, `npm`, `jsr`, ...)
    pub scheme: String,
    /// Registry-scoped identity, e.g. `deno.land/std` or `@scope/pkg`
    pub name: String,
    /// Opaque version token, if the specifier carries one
    pub version: Option<String>,
    /// Remainder after the version, starting with `/` or empty
    pub path: String,
}

impl Dependency {
    /// Parse a specifier into a Dependency
    ///
    /// The body is split on the rightmost `<name>@<version>` where the
    /// version is non-empty and runs up to the next `/`.
    pub fn parse(specifier: &str) -> Result<Self> {
        // Validate first; the split below works on the literal text so the
        // round trip stays byte-exact.
        url::Url::parse(specifier)
            .map_err(|e| Error::InvalidSpecifier(format!("{}: {}", specifier, e)))?;

        let (scheme, rest) = specifier
            .split_once(':')
            .ok_or_else(|| Error::InvalidSpecifier(format!("missing scheme: {}", specifier)))?;
        let scheme = scheme.to_ascii_lowercase();

        let body = if is_hierarchical(&scheme) {
            rest.strip_prefix("//").unwrap_or(rest)
        } else {
            rest
        };

        match split_version(body) {
            Some((name, version, path)) => Ok(Self {
                scheme,
                name: name.to_string(),
                version: Some(version.to_string()),
                path: path.to_string(),
            }),
            None => Ok(Self {
                scheme,
                name: body.to_string(),
                version: None,
                path: String::new(),
            }),
        }
    }

    /// Convert back to a specifier string
    pub fn to_uri(&self) -> String {
        let mut uri = self.header();
        uri.push_str(&self.name);
        if let Some(version) = &self.version {
            uri.push('@');
            uri.push_str(version);
        }
        uri.push_str(&self.path);
        uri
    }

    /// Byte range of the version token within `to_uri()`
    pub fn version_span(&self) -> Option<Range<usize>> {
        let version = self.version.as_ref()?;
        let start = self.header().len() + self.name.len() + 1;
        Some(start..start + version.len())
    }

    /// Copy of this dependency pinned to another version
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            ..self.clone()
        }
    }

    /// Copy of this dependency with neither version nor path
    pub fn base(&self) -> Self {
        Self {
            version: None,
            path: String::new(),
            ..self.clone()
        }
    }

    /// Whether the specifier points outside the local file system
    pub fn is_remote(&self) -> bool {
        self.scheme != "file"
    }

    /// Identity used for caching and locking: `scheme:name`
    pub fn identity(&self) -> String {
        format!("{}:{}", self.scheme, self.name)
    }

    fn header(&self) -> String {
        if is_hierarchical(&self.scheme) {
            format!("{}://", self.scheme)
        } else {
            format!("{}:", self.scheme)
        }
    }
}

fn is_hierarchical(scheme: &str) -> bool {
    HIERARCHICAL_SCHEMES.contains(&scheme)
}

/// Split `<name>@<version><path>` on the rightmost viable `@`.
fn split_version(body: &str) -> Option<(&str, &str, &str)> {
    body.match_indices('@')
        .rev()
        .filter(|(at, _)| *at > 0)
        .find_map(|(at, _)| {
            let rest = &body[at + 1..];
            let end = rest.find('/').unwrap_or(rest.len());
            if end == 0 {
                return None;
            }
            Some((&body[..at], &rest[..end], &rest[end..]))
        })
}

/// Parse a specifier into a Dependency
pub fn parse(specifier: &str) -> Result<Dependency> {
    Dependency::parse(specifier)
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

impl FromStr for Dependency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Dependency {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_uri())
    }
}

impl<'de> Deserialize<'de> for Dependency {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Dependency::parse(&s).map_err(serde::de::Error::custom)
    }
}
