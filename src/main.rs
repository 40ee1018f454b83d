//! molt CLI - find and apply updates to versioned imports

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use molt::commit::{self, CommitOptions};
use molt::config::{self, GroupBy, MoltConfig};
use molt::{
    CollectOptions, Git, ImportMap, LocalGraph, ResolverContext, ShellHook, Update, patch, report,
    ui,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "molt")]
#[command(version)]
#[command(about = "Update versioned imports in JavaScript and TypeScript modules")]
#[command(long_about = r#"
molt walks the module graph from your entry points, asks registries for the
latest version of every pinned import, and rewrites the version in place.

Example usage:
  molt check main.ts
  molt write "src/**/*.ts"
  molt commit main.ts --group-by package --prefix "build(deps): "
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// Entry point modules; glob patterns are expanded
    #[arg(required = true)]
    entrypoints: Vec<String>,

    /// Import map or deno.json to resolve bare specifiers through
    #[arg(long)]
    import_map: Option<PathBuf>,

    /// Skip packages whose name contains this string
    #[arg(long)]
    ignore: Vec<String>,

    /// Only update packages whose name contains this string
    #[arg(long)]
    only: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available updates without touching any file
    Check {
        #[command(flatten)]
        target: Target,

        /// Print updates as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply all updates to the working tree
    Write {
        #[command(flatten)]
        target: Target,
    },

    /// Apply updates as a sequence of commits
    Commit {
        #[command(flatten)]
        target: Target,

        /// How to group updates into commits
        #[arg(long, value_enum)]
        group_by: Option<GroupBy>,

        /// Prefix for commit messages, e.g. "build(deps): "
        #[arg(long)]
        prefix: Option<String>,

        /// Shell command to run before each commit
        #[arg(long)]
        pre_commit: Vec<String>,

        /// Shell command to run after each commit
        #[arg(long)]
        post_commit: Vec<String>,

        /// Write a one-line summary to this file
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Write a Markdown report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Write a default molt.toml
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);

    let load = || -> anyhow::Result<(MoltConfig, PathBuf)> {
        let config = config::load_config(Some(&config_path))?.unwrap_or_default();
        Ok((config, std::env::current_dir()?))
    };

    match cli.command {
        Commands::Init { force } => {
            config::write_config(&config_path, &MoltConfig::default(), force)?;
            ui::success(&format!("Wrote {}", config_path.display()));
        }

        Commands::Check { target, json } => {
            if json {
                molt::output::set_quiet(true);
            }
            let (config, cwd) = load()?;
            let updates = collect_updates(&target, &config, &cwd).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&updates)?);
                return Ok(());
            }
            if updates.is_empty() {
                ui::success("All dependencies are up to date");
                return Ok(());
            }
            println!("{}", ui::UpdateTable::new(&updates).build());
            println!("{}", ui::stats_table(&stats(&updates)));
        }

        Commands::Write { target } => {
            let (config, cwd) = load()?;
            let updates = collect_updates(&target, &config, &cwd).await?;
            if updates.is_empty() {
                ui::success("All dependencies are up to date");
                return Ok(());
            }
            for update in &updates {
                ui::update_row(update);
            }
            let written = patch::write(&updates)?;
            for path in &written {
                ui::file_modified(&path.display().to_string());
            }
            ui::success(&format!("Updated {} files", written.len()));
        }

        Commands::Commit {
            target,
            group_by,
            prefix,
            pre_commit,
            post_commit,
            summary,
            report: report_path,
        } => {
            let (config, cwd) = load()?;
            let updates = collect_updates(&target, &config, &cwd).await?;
            for update in &updates {
                ui::update_row(update);
            }

            let mut options = CommitOptions::new();
            if group_by.unwrap_or(config.group_by) == GroupBy::Package {
                options = options.group_by_package();
            }
            if let Some(prefix) = prefix.or(config.prefix.clone()) {
                options = options.with_prefix(prefix);
            }
            let pre_commit = or_configured(pre_commit, &config.pre_commit);
            if !pre_commit.is_empty() {
                options = options.with_pre_commit(Arc::new(ShellHook::new(pre_commit, &cwd)));
            }
            let post_commit = or_configured(post_commit, &config.post_commit);
            if !post_commit.is_empty() {
                options = options.with_post_commit(Arc::new(ShellHook::new(post_commit, &cwd)));
            }

            let sequence = commit::compose(&updates, options)?;
            if sequence.is_empty() {
                ui::success("All dependencies are up to date");
            } else {
                ui::phase(&format!("Committing {} groups", sequence.len()));
                sequence.exec(&Git::new(&cwd)).await?;
                for record in sequence.records() {
                    ui::commit_done(&record.message);
                }
            }

            if let Some(path) = summary {
                std::fs::write(&path, report::summary(&sequence))
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            if let Some(path) = report_path {
                std::fs::write(&path, report::report(&sequence))
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
        }
    }

    Ok(())
}

/// Expand entry point patterns; a pattern that matches nothing is kept as a literal path
fn expand_entrypoints(patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut entrypoints = Vec::new();
    for pattern in patterns {
        let matches = glob::glob(pattern)
            .with_context(|| format!("invalid entry point pattern: {}", pattern))?
            .collect::<Result<Vec<_>, _>>()?;
        if matches.is_empty() {
            entrypoints.push(PathBuf::from(pattern));
        } else {
            entrypoints.extend(matches);
        }
    }
    Ok(entrypoints)
}

/// Flag values, or the configured ones when no flag was given
fn or_configured(flags: Vec<String>, configured: &[String]) -> Vec<String> {
    if flags.is_empty() {
        configured.to_vec()
    } else {
        flags
    }
}

/// Occurrences, distinct packages and distinct files to patch
fn stats(updates: &[Update]) -> Vec<(&'static str, String)> {
    let packages: HashSet<&str> = updates.iter().map(|u| u.name.as_str()).collect();
    let files: HashSet<&Path> = updates.iter().map(Update::target).collect();
    vec![
        ("Updates", updates.len().to_string()),
        ("Packages", packages.len().to_string()),
        ("Files", files.len().to_string()),
    ]
}

async fn collect_updates(
    target: &Target,
    config: &MoltConfig,
    cwd: &Path,
) -> anyhow::Result<Vec<Update>> {
    let entrypoints = expand_entrypoints(&target.entrypoints)?;
    let resolver = ResolverContext::with_endpoints(&config.registries)?;
    let graph = LocalGraph::new()?;

    let import_map_path = target
        .import_map
        .clone()
        .or_else(|| config.import_map.clone())
        .or_else(|| config::detect_import_map(cwd));
    let import_map = match import_map_path {
        Some(path) => {
            tracing::debug!("Using import map {}", path.display());
            let map = ImportMap::load(&path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            Some(map)
        }
        None => None,
    };

    let mut ignore = config.ignore.clone();
    ignore.extend(target.ignore.iter().cloned());
    let only = or_configured(target.only.clone(), &config.only);

    let mut options = CollectOptions::new(&resolver, &graph)
        .with_ignore(ignore)
        .with_only(only);
    if let Some(import_map) = &import_map {
        options = options.with_import_map(import_map);
    }

    ui::header(&format!("Checking {} entry points", entrypoints.len()));
    let spinner = ui::Spinner::new("Resolving latest versions");
    let updates = molt::collect(&entrypoints, &options).await;
    let elapsed = spinner.finish();
    let updates = updates?;

    ui::info("Updates found", &format!("{} in {}", updates.len(), elapsed));
    Ok(updates)
}
