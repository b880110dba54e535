//! Agent tool invocation.
//!
//! The agent runs inside the sandbox as a single shell command:
//! `sweagent run --config <file> --problem_statement.text <text>`. The
//! config artifact itself is rendered by an external builder and handed in
//! as text; this module only writes it into the workspace and assembles the
//! command line. The problem statement is free text supplied by the task, so
//! it is defensively quoted before being embedded.

use anyhow::{Context, Result};
use std::path::Path;

/// Conventional name for the config artifact inside the workspace.
pub const AGENT_CONFIG_FILE: &str = "swe_agent_config.yaml";

/// Directory (relative to the workspace) where the agent writes its output.
pub const AGENT_OUTPUT_DIR: &str = "output";

/// One agent run: the task identity, the problem to solve, and the rendered
/// configuration the external config builder produced.
#[derive(Debug, Clone)]
pub struct AgentRun {
    /// Task instance identifier; also names the declared patch artifact.
    pub instance_id: String,
    /// Free-text problem statement passed to the agent tool.
    pub problem_statement: String,
    /// Rendered YAML configuration for the agent tool.
    pub config: String,
}

impl AgentRun {
    /// Write the config artifact into `workspace` so the in-container tool
    /// can read it from the bind-mounted working directory.
    pub async fn write_config(&self, workspace: &Path) -> Result<()> {
        let path = workspace.join(AGENT_CONFIG_FILE);
        tokio::fs::write(&path, &self.config)
            .await
            .with_context(|| format!("Failed to write agent config to {}", path.display()))?;
        Ok(())
    }

    /// Build the shell command that runs the agent inside the container.
    /// `work_dir` is the in-container working directory.
    #[must_use]
    pub fn command(&self, work_dir: &str) -> String {
        format!(
            "sweagent run --config {work_dir}/{AGENT_CONFIG_FILE} --problem_statement.text {}",
            shell_words::quote(&self.problem_statement)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(problem: &str) -> AgentRun {
        AgentRun {
            instance_id: "inst-1".to_string(),
            problem_statement: problem.to_string(),
            config: "agent: {}\n".to_string(),
        }
    }

    #[test]
    fn test_command_includes_config_path() {
        let cmd = run("fix the bug").command("/workspace");
        assert!(cmd.starts_with("sweagent run --config /workspace/swe_agent_config.yaml"));
        assert!(cmd.contains("--problem_statement.text"));
    }

    #[test]
    fn test_problem_statement_is_quoted() {
        let cmd = run("rename 1.txt; rm -rf /").command("/workspace");
        // The whole statement must survive as one argument.
        let parsed = shell_words::split(&cmd).unwrap();
        assert_eq!(parsed.last().unwrap(), "rename 1.txt; rm -rf /");
    }

    #[test]
    fn test_quoting_handles_quotes_and_newlines() {
        let cmd = run("it's \"broken\"\nsee trace").command("/workspace");
        let parsed = shell_words::split(&cmd).unwrap();
        assert_eq!(parsed.last().unwrap(), "it's \"broken\"\nsee trace");
    }

    #[tokio::test]
    async fn test_write_config() {
        let dir = tempfile::tempdir().unwrap();
        run("x").write_config(dir.path()).await.unwrap();
        let written = std::fs::read_to_string(dir.path().join(AGENT_CONFIG_FILE)).unwrap();
        assert_eq!(written, "agent: {}\n");
    }
}
