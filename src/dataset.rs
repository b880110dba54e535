//! Task records and dataset rows.
//!
//! A [`TaskRecord`] describes one coding task (problem statement, optional
//! seeded repository content, optional reference patch). [`DatasetRow`] is
//! the row schema the downstream trainer consumes: a structured conversation
//! prompt plus source/ability tags, the reward configuration, and free-form
//! extra info. Rows serialize with serde; columnar (parquet) encoding is the
//! consumer's side of the boundary, so this module writes JSON lines.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::reward::{RewardConfig, RewardStyle};

const SYSTEM_PROMPT: &str = "You are a helpful assistant that can interact with a computer to solve software engineering tasks.

When working on a task:
1. First understand the problem by reading relevant code
2. Make minimal changes to fix the issue
3. Verify your changes work correctly

Your goal is to create a patch that resolves the issue described in the problem statement.";

/// One conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// "system" or "user".
    pub role: String,
    /// Message text.
    pub content: String,
}

/// Repository identity for tasks sourced from a benchmark instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoInfo {
    /// Repository name (e.g. "org/project").
    pub repo_name: String,
    /// Commit the task is based on.
    pub base_commit: String,
}

/// One coding task to run in a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Free-text description of the problem to solve.
    pub problem_statement: String,
    /// Files to seed the workspace with.
    #[serde(default)]
    pub repo_content: BTreeMap<String, String>,
    /// Reference patch for scoring, when known.
    #[serde(default)]
    pub expected_patch: Option<String>,
    /// Benchmark instance metadata, when the task comes from one.
    #[serde(default)]
    pub repo_info: Option<RepoInfo>,
    /// Stable identifier for the task instance.
    #[serde(default)]
    pub instance_id: Option<String>,
}

/// One row of the serialized dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRow {
    /// Structured conversation the agent is prompted with.
    pub prompt: Vec<Message>,
    /// Where the task came from.
    pub data_source: String,
    /// Ability tag for the trainer.
    pub ability: String,
    /// How the produced patch is scored.
    pub reward_model: RewardConfig,
    /// Free-form extras (repo content, expected patch, split, index).
    pub extra_info: serde_json::Value,
    /// Name of the agent this row targets.
    pub agent_name: String,
}

/// Build the system/user conversation for a task.
#[must_use]
pub fn build_prompt(problem_statement: &str, repo_info: Option<&RepoInfo>) -> Vec<Message> {
    let mut user_content = format!(
        "<problem_statement>\n{problem_statement}\n</problem_statement>\n\n\
         Please analyze the problem and implement the necessary changes to resolve it.\n\
         Make minimal changes to the codebase while ensuring the issue is fully addressed."
    );

    if let Some(info) = repo_info {
        user_content = format!(
            "Repository: {}\nBase commit: {}\n\n{user_content}",
            info.repo_name, info.base_commit
        );
    }

    vec![
        Message {
            role: "system".to_string(),
            content: SYSTEM_PROMPT.to_string(),
        },
        Message {
            role: "user".to_string(),
            content: user_content,
        },
    ]
}

/// Convert a task record into a dataset row for the given split.
pub fn build_row(record: &TaskRecord, index: usize, split: &str, agent_name: &str) -> DatasetRow {
    let prompt = build_prompt(&record.problem_statement, record.repo_info.as_ref());

    let (data_source, reward_model) = match &record.repo_info {
        Some(_) => (
            "swe_bench_lite".to_string(),
            RewardConfig {
                style: RewardStyle::SweBench,
                ground_truth: None,
                gold_patch: record.expected_patch.clone(),
                test_patch: None,
                instance_id: record.instance_id.clone(),
            },
        ),
        None => (
            "swe_agent_simple".to_string(),
            RewardConfig {
                style: RewardStyle::Simple,
                ground_truth: record.expected_patch.clone(),
                gold_patch: None,
                test_patch: None,
                instance_id: record.instance_id.clone(),
            },
        ),
    };

    let extra_info = serde_json::json!({
        "index": index,
        "split": split,
        "repo_content": record.repo_content,
        "expected_patch": record.expected_patch,
        "problem_statement": record.problem_statement,
    });

    DatasetRow {
        prompt,
        data_source,
        ability: "software_engineering".to_string(),
        reward_model,
        extra_info,
        agent_name: agent_name.to_string(),
    }
}

/// Write rows as JSON lines to `path`.
pub fn write_jsonl(rows: &[DatasetRow], path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create dataset file: {}", path.display()))?;
    let mut writer = std::io::BufWriter::new(file);

    for row in rows {
        let line = serde_json::to_string(row).context("Failed to serialize dataset row")?;
        writeln!(writer, "{line}").context("Failed to write dataset row")?;
    }

    writer.flush().context("Failed to flush dataset file")?;
    Ok(())
}
