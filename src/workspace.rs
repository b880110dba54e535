//! Local workspace preparation.
//!
//! A workspace is the version-controlled file tree bind-mounted into the
//! sandbox. Seeding writes the task's repository content to a fresh temp
//! directory and commits a baseline, which later serves as the diff
//! reference point for patch extraction.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Materialize `repo_content` under a fresh temp directory and commit a
/// baseline. An empty mapping still produces a repository with one (empty)
/// commit so that diffing always has a reference point.
///
/// The returned path is not self-deleting; the sandbox's cleanup removes it.
pub async fn prepare(repo_content: &BTreeMap<String, String>) -> Result<PathBuf> {
    prepare_in(std::env::temp_dir(), repo_content).await
}

/// [`prepare`] with an explicit parent directory for the workspace.
pub(crate) async fn prepare_in(
    base: impl AsRef<Path>,
    repo_content: &BTreeMap<String, String>,
) -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix("swebox-")
        .tempdir_in(base)
        .context("Failed to create workspace directory")?;

    seed_files(dir.path(), repo_content).await?;
    init_baseline(dir.path()).await?;

    // Detach from TempDir only now; a seeding or baseline failure above
    // drops the guard and removes the half-built workspace.
    let dir = dir.keep();

    info!(
        "Workspace ready at {} with {} files",
        dir.display(),
        repo_content.len()
    );
    Ok(dir)
}

/// Write each `relative path -> content` entry under `dir`, creating parent
/// directories as needed.
async fn seed_files(dir: &Path, repo_content: &BTreeMap<String, String>) -> Result<()> {
    for (filename, content) in repo_content {
        let filepath = dir.join(filename);
        if let Some(parent) = filepath.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory for {filename}"))?;
        }
        tokio::fs::write(&filepath, content)
            .await
            .with_context(|| format!("Failed to write {filename}"))?;
    }
    Ok(())
}

/// Initialize a git history with a single baseline commit.
async fn init_baseline(dir: &Path) -> Result<()> {
    run_git(dir, &["init"]).await?;
    run_git(dir, &["config", "user.email", "sandbox@swebox.dev"]).await?;
    run_git(dir, &["config", "user.name", "swebox"]).await?;
    run_git(dir, &["add", "-A"]).await?;
    // --allow-empty keeps the no-content case commit-only, not commit-less.
    run_git(dir, &["commit", "--allow-empty", "-m", "Initial commit"]).await?;
    debug!("Baseline commit created in {}", dir.display());
    Ok(())
}

/// Run a git subcommand in `cwd`, failing with its stderr on non-zero exit.
pub(crate) async fn run_git(cwd: &Path, args: &[&str]) -> Result<String> {
    let output = tokio::process::Command::new("git")
        .current_dir(cwd)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {} failed: {}", args.join(" "), stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Whether `git` is usable on this host. Tests use this to skip gracefully.
pub(crate) async fn git_available() -> bool {
    tokio::process::Command::new("git")
        .arg("--version")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}
