//! Import maps - bare and partial specifiers mapped to full URLs
//!
//! Supports the `imports` and `scopes` sections of an import map, which is
//! also how `deno.json` declares its imports. Comments are allowed in the
//! source so JSONC configuration files load as well.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

/// Outcome of resolving a specifier through an import map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportMapResolution {
    /// Effective specifier after substitution
    pub specifier: String,
    /// The key that matched
    pub key: String,
    /// The value the key maps to
    pub value: String,
    /// Scope key as written in the map, when the entry came from `scopes`
    pub scope: Option<String>,
}

/// Trait for import map providers
pub trait ImportMapResolver: Send + Sync {
    /// The file the map was loaded from
    fn location(&self) -> &Path;

    /// Resolve a specifier imported by `referrer`
    fn resolve(&self, specifier: &str, referrer: &Path) -> Option<ImportMapResolution>;
}

#[derive(Debug, Default, Deserialize)]
struct ImportMapJson {
    #[serde(default)]
    imports: BTreeMap<String, String>,
    #[serde(default)]
    scopes: BTreeMap<String, BTreeMap<String, String>>,
}

/// Entries sorted by descending key length so the most specific key wins
#[derive(Debug, Clone)]
struct SpecifierMap {
    entries: Vec<(String, String)>,
}

impl SpecifierMap {
    fn new(entries: BTreeMap<String, String>) -> Self {
        let mut entries: Vec<_> = entries.into_iter().collect();
        entries.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        Self { entries }
    }

    fn resolve(&self, specifier: &str, scope: Option<&str>) -> Option<ImportMapResolution> {
        self.entries.iter().find_map(|(key, value)| {
            let rest = if key == specifier {
                ""
            } else if key.ends_with('/') {
                specifier.strip_prefix(key.as_str())?
            } else {
                return None;
            };
            Some(ImportMapResolution {
                specifier: format!("{}{}", value, rest),
                key: key.clone(),
                value: value.clone(),
                scope: scope.map(str::to_string),
            })
        })
    }
}

#[derive(Debug, Clone)]
struct Scope {
    /// Key as written in the map
    key: String,
    /// Key resolved against the map location
    prefix: String,
    map: SpecifierMap,
}

/// An import map loaded from disk
#[derive(Debug, Clone)]
pub struct ImportMap {
    location: PathBuf,
    imports: SpecifierMap,
    /// Scopes, most specific first
    scopes: Vec<Scope>,
}

impl ImportMap {
    /// Load an import map (or `deno.json`) from a file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(path, &text)
    }

    /// Parse import map text located at `location`
    pub fn parse(location: &Path, text: &str) -> Result<Self> {
        let json: ImportMapJson = serde_json::from_str(&strip_comments(text))
            .map_err(|e| Error::ImportMap(format!("{}: {}", location.display(), e)))?;

        let base = file_url(location)?;
        let mut scopes = json
            .scopes
            .into_iter()
            .map(|(key, entries)| {
                let prefix = base
                    .join(&key)
                    .map(String::from)
                    .map_err(|e| Error::ImportMap(format!("invalid scope {}: {}", key, e)))?;
                Ok(Scope {
                    key,
                    prefix,
                    map: SpecifierMap::new(entries),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        scopes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        Ok(Self {
            location: location.to_path_buf(),
            imports: SpecifierMap::new(json.imports),
            scopes,
        })
    }
}

impl ImportMapResolver for ImportMap {
    fn location(&self) -> &Path {
        &self.location
    }

    fn resolve(&self, specifier: &str, referrer: &Path) -> Option<ImportMapResolution> {
        if let Ok(referrer) = file_url(referrer) {
            let referrer = referrer.as_str();
            for scope in &self.scopes {
                let in_scope = if scope.prefix.ends_with('/') {
                    referrer.starts_with(scope.prefix.as_str())
                } else {
                    referrer == scope.prefix
                };
                if in_scope {
                    if let Some(resolution) = scope.map.resolve(specifier, Some(&scope.key)) {
                        return Some(resolution);
                    }
                }
            }
        }
        self.imports.resolve(specifier, None)
    }
}

fn file_url(path: &Path) -> Result<Url> {
    let absolute = std::path::absolute(path)?;
    Url::from_file_path(&absolute)
        .map_err(|_| Error::ImportMap(format!("not a file path: {}", absolute.display())))
}

/// Remove `//` and `/* */` comments outside of string literals
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: &str = r#"{
  // shared standard library
  "imports": {
    "std/": "https://deno.land/std@0.200.0/",
    "std/testing/": "https://deno.land/std@0.190.0/testing/",
    "preact": "npm:preact@10.0.0",
    "/* not a comment */": "https://example.com/a@1.0.0/"
  },
  "scopes": {
    "./vendor/": {
      "preact": "npm:preact@8.0.0"
    }
  }
}"#;

    fn map() -> ImportMap {
        ImportMap::parse(Path::new("/work/import_map.json"), MAP).unwrap()
    }

    #[test]
    fn test_exact_match() {
        let resolved = map().resolve("preact", Path::new("/work/main.ts")).unwrap();
        assert_eq!(resolved.specifier, "npm:preact@10.0.0");
        assert_eq!(resolved.key, "preact");
        assert_eq!(resolved.scope, None);
    }

    #[test]
    fn test_prefix_match() {
        let resolved = map()
            .resolve("std/path/mod.ts", Path::new("/work/main.ts"))
            .unwrap();
        assert_eq!(resolved.specifier, "https://deno.land/std@0.200.0/path/mod.ts");
        assert_eq!(resolved.key, "std/");
        assert_eq!(resolved.value, "https://deno.land/std@0.200.0/");
    }

    #[test]
    fn test_longest_prefix_wins() {
        let resolved = map()
            .resolve("std/testing/asserts.ts", Path::new("/work/main.ts"))
            .unwrap();
        assert_eq!(resolved.key, "std/testing/");
        assert_eq!(
            resolved.specifier,
            "https://deno.land/std@0.190.0/testing/asserts.ts"
        );
    }

    #[test]
    fn test_scopes_take_precedence() {
        let resolved = map()
            .resolve("preact", Path::new("/work/vendor/legacy.ts"))
            .unwrap();
        assert_eq!(resolved.specifier, "npm:preact@8.0.0");
        assert_eq!(resolved.scope.as_deref(), Some("./vendor/"));

        let fallback = map()
            .resolve("std/fmt/colors.ts", Path::new("/work/vendor/legacy.ts"))
            .unwrap();
        assert_eq!(fallback.key, "std/");
    }

    #[test]
    fn test_unmapped() {
        assert_eq!(map().resolve("lodash", Path::new("/work/main.ts")), None);
        assert_eq!(map().resolve("./local.ts", Path::new("/work/main.ts")), None);
    }

    #[test]
    fn test_strip_comments_keeps_strings() {
        let stripped = strip_comments(r#"{"a": "x//y", /* c */ "b": "\"/*" // tail"#);
        assert_eq!(stripped, r#"{"a": "x//y",  "b": "\"/*" "#);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ImportMap::parse(Path::new("/work/import_map.json"), "{ imports: }"),
            Err(Error::ImportMap(_))
        ));
    }
}
