//! `molt.toml` loading and defaults
//!
//! Command line flags override what is set here.

use crate::resolver::RegistryEndpoints;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How updates are grouped into commits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// One commit for everything
    #[default]
    Single,
    /// One commit per package
    Package,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MoltConfig {
    pub import_map: Option<PathBuf>,
    pub prefix: Option<String>,
    pub group_by: GroupBy,
    pub pre_commit: Vec<String>,
    pub post_commit: Vec<String>,
    pub ignore: Vec<String>,
    pub only: Vec<String>,
    pub registries: RegistryEndpoints,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("molt.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<MoltConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: MoltConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &MoltConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Find an import map next to the entry points when none is configured
pub fn detect_import_map(root: &Path) -> Option<PathBuf> {
    ["import_map.json", "deno.json", "deno.jsonc"]
        .into_iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
}
