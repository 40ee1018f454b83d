//! Module Graph - the import occurrences reachable from a set of entry points
//!
//! The collector only needs, per local module, the specifier literals it
//! imports and where they sit in the file. Anything able to produce that can
//! implement [`ModuleGraph`]. [`LocalGraph`] is the built-in implementation:
//! a tree-sitter scanner that follows relative imports between local files.

use crate::update::Span;
use crate::{Error, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};
use tree_sitter::{Language, Parser, Query, QueryCursor};

/// File extensions the local scanner follows
pub const MODULE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

/// A specifier literal inside a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Literal text between the quotes
    pub specifier: String,
    /// Byte range of the literal, quotes excluded
    pub span: Span,
}

/// A local module and its outgoing imports
#[derive(Debug, Clone)]
pub struct Module {
    pub path: PathBuf,
    pub imports: Vec<Import>,
}

/// Trait for module graph builders
#[async_trait]
pub trait ModuleGraph: Send + Sync {
    /// Every local module reachable from the entry points, entry points first
    async fn modules(&self, entrypoints: &[PathBuf]) -> Result<Vec<Module>>;
}

/// Grammar used for a module, picked by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    JavaScript,
    TypeScript,
    Tsx,
}

impl Dialect {
    /// Unknown extensions are read as TypeScript, a superset of JavaScript
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "tsx" => Self::Tsx,
            _ => Self::TypeScript,
        }
    }
}

/// A grammar together with the compiled import query
struct Grammar {
    language: Language,
    query: Query,
}

impl Grammar {
    fn new(language: Language) -> Result<Self> {
        let query = Query::new(&language, IMPORT_QUERY)
            .map_err(|e| Error::Parse(format!("Query parse error: {}", e)))?;
        Ok(Self { language, query })
    }
}

const IMPORT_QUERY: &str = include_str!("../queries/imports.scm");

/// Tree-sitter scanner over local source files
///
/// Only real import syntax is reported; specifiers mentioned inside
/// comments, strings or template literals are not. The one exception is the
/// `@deno-types="..."` pragma, which lives in a comment by definition.
pub struct LocalGraph {
    javascript: Grammar,
    typescript: Grammar,
    tsx: Grammar,
    pragma: Regex,
}

impl LocalGraph {
    /// Create a scanner for the JavaScript and TypeScript grammars
    pub fn new() -> Result<Self> {
        Ok(Self {
            javascript: Grammar::new(tree_sitter_javascript::LANGUAGE.into())?,
            typescript: Grammar::new(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())?,
            tsx: Grammar::new(tree_sitter_typescript::LANGUAGE_TSX.into())?,
            pragma: Regex::new(r#"@deno-types\s*=\s*['"]([^'"\r\n]+)['"]"#)?,
        })
    }

    fn grammar(&self, dialect: Dialect) -> &Grammar {
        match dialect {
            Dialect::JavaScript => &self.javascript,
            Dialect::TypeScript => &self.typescript,
            Dialect::Tsx => &self.tsx,
        }
    }

    /// Extract import specifiers from module source, in source order
    pub fn scan(&self, dialect: Dialect, content: &str) -> Result<Vec<Import>> {
        let grammar = self.grammar(dialect);
        let mut parser = Parser::new();
        parser
            .set_language(&grammar.language)
            .map_err(|e| Error::Parse(format!("Failed to set language: {}", e)))?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| Error::Parse("Failed to parse module".to_string()))?;

        let source = content.as_bytes();
        let names = grammar.query.capture_names();
        let mut cursor = QueryCursor::new();
        let mut seen = HashSet::new();
        let mut imports = Vec::new();

        for query_match in cursor.matches(&grammar.query, tree.root_node(), source) {
            for capture in query_match.captures {
                let node = capture.node;
                match names[capture.index as usize] {
                    "import.source" => {
                        let Ok(text) = node.utf8_text(source) else {
                            continue;
                        };
                        if seen.insert(node.start_byte()) {
                            imports.push(Import {
                                specifier: text.to_string(),
                                span: Span::new(node.start_byte(), node.end_byte()),
                            });
                        }
                    }
                    "import.pragma" => {
                        let Ok(text) = node.utf8_text(source) else {
                            continue;
                        };
                        for captures in self.pragma.captures_iter(text) {
                            let Some(m) = captures.get(1) else {
                                continue;
                            };
                            let start = node.start_byte() + m.start();
                            if seen.insert(start) {
                                imports.push(Import {
                                    specifier: m.as_str().to_string(),
                                    span: Span::new(start, node.start_byte() + m.end()),
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        imports.sort_by_key(|import| import.span);
        Ok(imports)
    }

    /// Resolve a specifier to a local module path, if it refers to one
    pub fn resolve_local(referrer: &Path, specifier: &str) -> Option<PathBuf> {
        let path = if specifier.starts_with("./") || specifier.starts_with("../") {
            referrer.parent().unwrap_or(Path::new("")).join(specifier)
        } else if specifier.starts_with('/') {
            PathBuf::from(specifier)
        } else if specifier.starts_with("file:") {
            url::Url::parse(specifier).ok()?.to_file_path().ok()?
        } else {
            return None;
        };

        let path = normalize(&path);
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        MODULE_EXTENSIONS.contains(&ext).then_some(path)
    }
}

#[async_trait]
impl ModuleGraph for LocalGraph {
    async fn modules(&self, entrypoints: &[PathBuf]) -> Result<Vec<Module>> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<(PathBuf, bool)> = entrypoints
            .iter()
            .map(|p| (normalize(p), true))
            .collect();
        let mut modules = Vec::new();

        while let Some((path, is_entrypoint)) = queue.pop_front() {
            if !visited.insert(path.clone()) {
                continue;
            }

            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                // Entry points must exist; dangling imports are someone else's problem
                Err(e) if is_entrypoint => return Err(e.into()),
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", path.display(), e);
                    continue;
                }
            };

            let imports = self.scan(Dialect::for_path(&path), &content)?;
            for import in &imports {
                if let Some(local) = Self::resolve_local(&path, &import.specifier) {
                    if !visited.contains(&local) {
                        queue.push_back((local, false));
                    }
                }
            }

            tracing::debug!("Scanned {} ({} imports)", path.display(), imports.len());
            modules.push(Module { path, imports });
        }

        Ok(modules)
    }
}

/// Lexically normalize `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"import { assert } from "https://deno.land/std@0.200.0/assert/mod.ts";
import type { Options } from './types.ts';
import "npm:preact@10.0.0";
export * from "jsr:@std/path@0.210.0";
import {
  a,
  b,
} from "https://esm.sh/lodash@4.17.21";
const mod = await import("./lazy.ts");
// @deno-types="npm:@types/node@20.0.0"
export const note = "not an import";
"#;

    #[test]
    fn test_scan_finds_all_forms() {
        let graph = LocalGraph::new().unwrap();
        let specifiers: Vec<String> = graph
            .scan(Dialect::TypeScript, SOURCE)
            .unwrap()
            .into_iter()
            .map(|i| i.specifier)
            .collect();
        assert_eq!(
            specifiers,
            vec![
                "https://deno.land/std@0.200.0/assert/mod.ts",
                "./types.ts",
                "npm:preact@10.0.0",
                "jsr:@std/path@0.210.0",
                "https://esm.sh/lodash@4.17.21",
                "./lazy.ts",
                "npm:@types/node@20.0.0",
            ]
        );
    }

    #[test]
    fn test_scan_spans_point_at_literals() {
        let graph = LocalGraph::new().unwrap();
        for import in graph.scan(Dialect::TypeScript, SOURCE).unwrap() {
            assert_eq!(&SOURCE[import.span.start..import.span.end], import.specifier);
        }
    }

    #[test]
    fn test_scan_ignores_comments_and_strings() {
        let graph = LocalGraph::new().unwrap();
        let source = "/*\nimport { old } from \"npm:legacy@1.0.0\";\n*/\n\
                      // import \"npm:commented@1.0.0\";\n\
                      const s = `\nimport \"npm:intemplate@1.0.0\"\n`;\n\
                      const t = 'import \"npm:instring@1.0.0\"';\n";
        for dialect in [Dialect::JavaScript, Dialect::TypeScript, Dialect::Tsx] {
            assert!(graph.scan(dialect, source).unwrap().is_empty());
        }
    }

    #[test]
    fn test_scan_jsx_module() {
        let graph = LocalGraph::new().unwrap();
        let source = "import { h } from \"npm:preact@10.0.0\";\nexport const App = () => <div>import \"npm:fake@1.0.0\"</div>;\n";
        let imports = graph.scan(Dialect::JavaScript, source).unwrap();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].specifier, "npm:preact@10.0.0");
    }

    #[test]
    fn test_dialect_for_path() {
        assert_eq!(Dialect::for_path(Path::new("a.mjs")), Dialect::JavaScript);
        assert_eq!(Dialect::for_path(Path::new("a.tsx")), Dialect::Tsx);
        assert_eq!(Dialect::for_path(Path::new("a.mts")), Dialect::TypeScript);
        assert_eq!(Dialect::for_path(Path::new("main")), Dialect::TypeScript);
    }

    #[test]
    fn test_resolve_local() {
        let referrer = Path::new("src/app/main.ts");
        assert_eq!(
            LocalGraph::resolve_local(referrer, "./util.ts"),
            Some(PathBuf::from("src/app/util.ts"))
        );
        assert_eq!(
            LocalGraph::resolve_local(referrer, "../lib/mod.js"),
            Some(PathBuf::from("src/lib/mod.js"))
        );
        assert_eq!(LocalGraph::resolve_local(referrer, "./data.json"), None);
        assert_eq!(LocalGraph::resolve_local(referrer, "npm:preact@10.0.0"), None);
    }

    #[tokio::test]
    async fn test_modules_follow_relative_imports() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("main.ts"),
            "import { x } from \"./lib.ts\";\nimport \"./missing.ts\";\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("lib.ts"),
            "export { y } from \"npm:preact@10.0.0\";\nimport \"./main.ts\";\n",
        )
        .unwrap();

        let graph = LocalGraph::new().unwrap();
        let modules = graph
            .modules(&[dir.path().join("main.ts")])
            .await
            .unwrap();

        let names: Vec<_> = modules
            .iter()
            .map(|m| m.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["main.ts", "lib.ts"]);
        assert_eq!(modules[1].imports[0].specifier, "npm:preact@10.0.0");
    }

    #[tokio::test]
    async fn test_missing_entrypoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let graph = LocalGraph::new().unwrap();
        assert!(graph.modules(&[dir.path().join("nope.ts")]).await.is_err());
    }
}
