//! Patch recovery after a task run.
//!
//! The agent may or may not have written its result where it was told to, so
//! extraction walks an ordered list of strategies and stops at the first
//! success. The order encodes a policy: an explicit artifact the tool wrote
//! is authoritative over an inferred diff, because the tool may have
//! committed intermediate work that should not leak into the result.
//!
//! Recovering nothing is not an error; a no-op task legitimately produces no
//! change, signalled by `Ok(None)`.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::workspace::run_git;

/// Extraction strategies, tried in order. First success wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    /// A `.patch` file the agent tool declared in the output directory.
    DeclaredFile,
    /// Diff of the working tree against the baseline commit.
    BaselineDiff,
}

const STRATEGIES: [Strategy; 2] = [Strategy::DeclaredFile, Strategy::BaselineDiff];

/// Recovers the patch a task run produced, independent of whether the run
/// succeeded, failed, or timed out.
#[derive(Debug, Clone)]
pub struct PatchExtractor {
    output_dir: PathBuf,
    workspace: Option<PathBuf>,
    instance_id: String,
}

impl PatchExtractor {
    /// Creates an extractor over the agent's output directory, the (optional)
    /// workspace, and the instance identifier used for artifact file naming.
    pub fn new(
        output_dir: impl Into<PathBuf>,
        workspace: Option<PathBuf>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            workspace,
            instance_id: instance_id.into(),
        }
    }

    /// Try each strategy in order; `Ok(None)` means no change was produced.
    pub async fn extract(&self) -> Result<Option<String>> {
        for strategy in STRATEGIES {
            if let Some(patch) = self.try_strategy(strategy).await {
                debug!("Patch recovered via {strategy:?} ({} bytes)", patch.len());
                return Ok(Some(patch));
            }
        }
        debug!("No patch found; treating task as no-change");
        Ok(None)
    }

    async fn try_strategy(&self, strategy: Strategy) -> Option<String> {
        match strategy {
            Strategy::DeclaredFile => self.find_declared_file().await,
            Strategy::BaselineDiff => self.diff_against_baseline().await,
        }
    }

    /// Look for `{instance_id}.patch` first, then any other `*.patch` in the
    /// output directory (sorted for determinism). Empty files do not count.
    async fn find_declared_file(&self) -> Option<String> {
        if !self.instance_id.is_empty() {
            let named = self.output_dir.join(format!("{}.patch", self.instance_id));
            if let Some(content) = read_non_empty(&named).await {
                return Some(content);
            }
        }

        let mut candidates = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.output_dir).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "patch") {
                candidates.push(path);
            }
        }
        candidates.sort();

        for path in candidates {
            if let Some(content) = read_non_empty(&path).await {
                return Some(content);
            }
        }
        None
    }

    /// Diff the working tree against the baseline (root) commit. Untracked
    /// files are staged first so new files show up in the diff.
    async fn diff_against_baseline(&self) -> Option<String> {
        let workspace = self.workspace.as_deref()?;
        if !workspace.join(".git").exists() {
            return None;
        }

        let baseline = match run_git(workspace, &["rev-list", "--max-parents=0", "HEAD"]).await {
            Ok(out) => out.trim().to_string(),
            Err(e) => {
                warn!("Could not resolve baseline commit: {e}");
                return None;
            }
        };
        if baseline.is_empty() {
            return None;
        }

        if let Err(e) = run_git(workspace, &["add", "-A"]).await {
            warn!("Could not stage workspace for diffing: {e}");
            return None;
        }

        match run_git(workspace, &["diff", &baseline]).await {
            Ok(diff) if !diff.trim().is_empty() => Some(diff),
            Ok(_) => None,
            Err(e) => {
                warn!("Diff against baseline failed: {e}");
                None
            }
        }
    }
}

/// Read `path` if it exists and has non-whitespace content.
async fn read_non_empty(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if !content.trim().is_empty() => Some(content),
        _ => None,
    }
}
