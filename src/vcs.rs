//! Version control - staging and committing patched files

use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Trait for version control backends
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Stage exactly these files
    async fn stage(&self, files: &[PathBuf]) -> Result<()>;

    /// Commit whatever is staged
    async fn commit(&self, message: &str) -> Result<()>;
}

/// Git working tree driven through the `git` executable
pub struct Git {
    root: PathBuf,
}

impl Git {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn run(&self, args: &[&str], paths: &[PathBuf]) -> Result<String> {
        let mut cmd = Command::new("git");
        cmd.args(args).args(paths).current_dir(&self.root);

        let out = cmd
            .output()
            .await
            .map_err(|e| Error::Vcs(format!("failed to execute git: {}", e)))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(Error::Vcs(format!("git {} failed: {}", args.join(" "), stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
}

#[async_trait]
impl Vcs for Git {
    async fn stage(&self, files: &[PathBuf]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        self.run(&["add", "--"], files).await?;
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<()> {
        let summary = self.run(&["commit", "-m", message], &[]).await?;
        tracing::debug!("{}", summary);
        Ok(())
    }
}
