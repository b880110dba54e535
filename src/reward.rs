//! Patch-based reward scoring.
//!
//! Scores a produced patch against a reference in [0.0, 1.0]:
//! exact (normalized) match scores 1.0, matching the full changed-file set
//! scores 0.5, partial file overlap scales between 0.2 and 0.5, a patch that
//! touches none of the expected files still scores 0.1 for being a valid
//! patch, and no patch at all scores 0.0.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Reward configuration attached to a task record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Scoring style discriminator.
    pub style: RewardStyle,
    /// Reference patch for [`RewardStyle::Simple`].
    #[serde(default)]
    pub ground_truth: Option<String>,
    /// Gold patch for [`RewardStyle::SweBench`].
    #[serde(default)]
    pub gold_patch: Option<String>,
    /// Test patch accompanying a SWE-bench instance.
    #[serde(default)]
    pub test_patch: Option<String>,
    /// SWE-bench instance identifier.
    #[serde(default)]
    pub instance_id: Option<String>,
}

/// How a patch is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardStyle {
    /// Direct comparison against a reference patch.
    #[serde(rename = "swe_agent")]
    Simple,
    /// SWE-bench instance: compared against the gold patch. Running the
    /// instance's test suite is an external collaborator's job.
    SweBench,
    /// Any style this crate does not know. Scored with the default
    /// ground-truth comparison rather than rejected, so records from newer
    /// dataset generators still get a usable (if coarse) reward.
    #[serde(other)]
    Unknown,
}

/// Normalize a patch for comparison: trim trailing whitespace, drop blank
/// lines and the volatile `index` header lines.
#[must_use]
pub fn normalize_patch(patch: &str) -> String {
    patch
        .trim()
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty() && !line.starts_with("index "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract the changed file paths (the `b/` side) from `diff --git` headers.
#[must_use]
pub fn extract_changed_files(patch: &str) -> Vec<String> {
    patch
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("diff --git a/")?;
            let (_, b_side) = rest.split_once(" b/")?;
            Some(b_side.to_string())
        })
        .collect()
}

/// Compare a generated patch against an expected one, returning a similarity
/// score in [0.0, 1.0].
#[must_use]
pub fn compare_patches(generated: &str, expected: &str) -> f64 {
    if generated.is_empty() {
        return 0.0;
    }

    if normalize_patch(generated) == normalize_patch(expected) {
        return 1.0;
    }

    let gen_files: std::collections::BTreeSet<_> =
        extract_changed_files(generated).into_iter().collect();
    let exp_files: std::collections::BTreeSet<_> =
        extract_changed_files(expected).into_iter().collect();

    if exp_files.is_empty() {
        return if gen_files.is_empty() { 0.0 } else { 0.1 };
    }

    #[allow(clippy::cast_precision_loss)]
    let overlap = gen_files.intersection(&exp_files).count() as f64 / exp_files.len() as f64;

    if (overlap - 1.0).abs() < f64::EPSILON {
        0.5
    } else if overlap > 0.0 {
        0.2 + 0.3 * overlap
    } else {
        0.1
    }
}

/// Score `patch` (possibly absent) against `config`.
#[must_use]
pub fn compute_reward(patch: Option<&str>, config: &RewardConfig) -> f64 {
    let Some(patch) = patch else {
        return 0.0;
    };

    match config.style {
        RewardStyle::Simple => {
            compare_patches(patch, config.ground_truth.as_deref().unwrap_or(""))
        }
        RewardStyle::SweBench => {
            let gold = config.gold_patch.as_deref().unwrap_or_else(|| {
                warn!("SWE-bench reward config has no gold patch");
                ""
            });
            compare_patches(patch, gold)
        }
        RewardStyle::Unknown => {
            warn!("Unknown reward style, using ground-truth comparison");
            compare_patches(patch, config.ground_truth.as_deref().unwrap_or(""))
        }
    }
}

/// Score a batch of patches against their configs, elementwise.
#[must_use]
pub fn compute_batch_rewards(patches: &[Option<String>], configs: &[RewardConfig]) -> Vec<f64> {
    patches
        .iter()
        .zip(configs)
        .map(|(patch, config)| compute_reward(patch.as_deref(), config))
        .collect()
}
