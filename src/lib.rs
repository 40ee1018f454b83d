//! # Molt - Dependency update engine
//!
//! Keeps modules that import dependencies by versioned URL or registry
//! specifier up to date.
//!
//! Molt provides:
//! - A lossless parser for versioned specifiers (`https://`, `npm:`, `jsr:`)
//! - A version resolver with per-package memoization and request coalescing
//! - An update collector over a module graph and optional import map
//! - Format-preserving patches for source files and import maps
//! - An ordered commit sequence with pre/post commit hooks

pub mod specifier;
pub mod version;
pub mod resolver;
pub mod graph;
pub mod import_map;
pub mod update;
pub mod collect;
pub mod patch;
pub mod commit;
pub mod vcs;
pub mod report;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use specifier::Dependency;
pub use resolver::{ResolverContext, UpdatedDependency};
pub use graph::{Dialect, LocalGraph, ModuleGraph};
pub use import_map::{ImportMap, ImportMapResolver};
pub use update::{ImportMapIndirection, Span, Update, VersionFact, reconcile};
pub use collect::{CollectOptions, collect};
pub use patch::FileChange;
pub use commit::{CommitHook, CommitOptions, CommitRecord, CommitSequence, ShellHook};
pub use vcs::{Git, Vcs};

/// Result type alias for Molt operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Molt operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid specifier: {0}")]
    InvalidSpecifier(String),

    #[error("Not found in registry: {0}")]
    NotFound(String),

    #[error("Malformed registry response for {name}: {message}")]
    MalformedRegistryResponse { name: String, message: String },

    #[error("Failed to resolve {name}: {message}")]
    Resolution { name: String, message: String },

    #[error("Conflicting versions for {name}: {left} and {right}")]
    ConflictingVersions {
        name: String,
        left: String,
        right: String,
    },

    #[error("Malformed span in {location}: {message}")]
    MalformedSpan { location: String, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Import map error: {0}")]
    ImportMap(String),

    #[error("Version control error: {0}")]
    Vcs(String),

    #[error("Hook `{command}` failed: {message}")]
    Hook { command: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}
