//! Docker-backed environment controller.
//!
//! One [`DockerSandbox`] owns exactly one container lifecycle:
//! `create` provisions a container bound to a freshly seeded workspace,
//! `exec` runs commands inside it under a bounded wait, and `cleanup` tears
//! everything down best-effort. Operations against one sandbox are expected
//! to be issued sequentially by the owning caller; nothing here serializes
//! concurrent `exec` calls.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::SandboxError;
use super::runtime;
use crate::agent::{AgentRun, AGENT_OUTPUT_DIR};
use crate::config::{parse_memory_limit, SandboxConfig};
use crate::patch::PatchExtractor;
use crate::workspace;

/// Sentinel exit code for a command that hit its wait bound. Distinct from
/// any real process exit code, which is always non-negative.
pub const TIMEOUT_EXIT_CODE: i64 = -1;

/// Sentinel exit code for a docker client process that was killed by a
/// signal instead of exiting. Distinct from the command's own failure codes
/// and from [`TIMEOUT_EXIT_CODE`].
pub const SIGNAL_EXIT_CODE: i64 = -2;

const CLEANUP_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Identity of a provisioned sandbox: the runtime-assigned container id, the
/// generated name, and the workspace bound into it.
#[derive(Debug, Clone)]
pub struct SandboxHandle {
    /// Container id assigned by the runtime.
    pub container_id: String,
    /// Unique human-readable container name.
    pub container_name: String,
    /// Local workspace directory bind-mounted into the container.
    pub workspace: PathBuf,
}

/// Result of one command invocation inside the sandbox.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Process exit code, or [`TIMEOUT_EXIT_CODE`] when the wait elapsed.
    pub exit_code: i64,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandResult {
    /// Whether this invocation hit its wait bound.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.exit_code == TIMEOUT_EXIT_CODE
    }

    /// Whether the command exited successfully.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Outcome of a full task run: the agent's exit status and combined output,
/// plus the recovered patch (if any change was produced).
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Exit code of the agent command (may be the timeout sentinel).
    pub exit_code: i64,
    /// Combined stdout/stderr of the agent run.
    pub output: String,
    /// The recovered patch; `None` means no change.
    pub patch: Option<String>,
}

/// Owns the full lifecycle of one sandbox container.
pub struct DockerSandbox {
    config: SandboxConfig,
    handle: Option<SandboxHandle>,
}

impl DockerSandbox {
    /// Creates a controller with the given configuration. No resources are
    /// allocated until [`DockerSandbox::create`] is called.
    #[must_use]
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            handle: None,
        }
    }

    /// The active handle, if a container is provisioned.
    #[must_use]
    pub fn handle(&self) -> Option<&SandboxHandle> {
        self.handle.as_ref()
    }

    /// The controller's configuration.
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Provision the sandbox: verify the runtime and image, seed the
    /// workspace from `repo_content`, and start a container bound to it.
    ///
    /// Preconditions are checked in order; the runtime check runs before any
    /// workspace mutation.
    pub async fn create(
        &mut self,
        repo_content: &BTreeMap<String, String>,
    ) -> Result<SandboxHandle, SandboxError> {
        if self.handle.is_some() {
            return Err(SandboxError::creation_failed(
                "sandbox already created; one controller owns one container",
            ));
        }

        runtime::ensure_runtime_available().await?;
        runtime::ensure_image_available(&self.config.image, self.config.build_context.as_deref())
            .await?;
        self.validate_config()?;

        let workspace = workspace::prepare(repo_content)
            .await
            .map_err(|e| SandboxError::workspace_failed(e.to_string()))?;

        let container_name = format!("swebox-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);

        let container_id = match self.start_container(&container_name, &workspace).await {
            Ok(id) => id,
            Err(e) => {
                // The container never started; don't leave the workspace behind.
                if let Err(rm) = tokio::fs::remove_dir_all(&workspace).await {
                    warn!("Failed to remove workspace after create error: {rm}");
                }
                return Err(e);
            }
        };

        let handle = SandboxHandle {
            container_id: container_id.clone(),
            container_name,
            workspace,
        };
        info!("Container ready: {}", &container_id[..12.min(container_id.len())]);

        self.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Reject non-positive limits and empty placement fields before handing
    /// them to the runtime.
    fn validate_config(&self) -> Result<(), SandboxError> {
        let c = &self.config;

        let memory = parse_memory_limit(&c.memory_limit)
            .map_err(|e| SandboxError::creation_failed(format!("invalid memory limit: {e}")))?;
        if memory <= 0 {
            return Err(SandboxError::creation_failed(format!(
                "memory limit must be positive, got {}",
                c.memory_limit
            )));
        }
        if c.cpu_count == 0 {
            return Err(SandboxError::creation_failed("cpu count must be positive"));
        }
        if c.startup_timeout_secs == 0 || c.execution_timeout_secs == 0 {
            return Err(SandboxError::creation_failed(
                "startup and execution timeouts must be positive",
            ));
        }
        if c.network_mode.is_empty() {
            return Err(SandboxError::creation_failed("network mode must be set"));
        }
        if c.work_dir.is_empty() {
            return Err(SandboxError::creation_failed(
                "working directory must be set",
            ));
        }
        Ok(())
    }

    /// `docker run` the container detached, bound to `workspace`, with the
    /// configured limits, network mode, and injected environment.
    async fn start_container(
        &self,
        name: &str,
        workspace: &std::path::Path,
    ) -> Result<String, SandboxError> {
        let c = &self.config;
        let cpus = c.cpu_count.to_string();
        let bind = format!("{}:{}", workspace.display(), c.work_dir);

        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            name.into(),
            "--network".into(),
            c.network_mode.clone(),
            "-m".into(),
            c.memory_limit.clone(),
            format!("--cpus={cpus}"),
            "-v".into(),
            bind,
            "-w".into(),
            c.work_dir.clone(),
        ];

        for (key, value) in self.injected_env() {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }

        // Keep-alive command so exec has a live target.
        args.push(c.image.clone());
        args.push("sleep".into());
        args.push("infinity".into());

        debug!("Creating container: {name}");
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = runtime::run_docker(&arg_refs, c.startup_timeout())
            .await?
            .ok_or_else(|| self.creation_timeout_error())?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SandboxError::creation_failed(format!(
                "Failed to create container '{name}':\n{stderr}\n\
                 Troubleshooting:\n\
                 - Check if port {} is available\n\
                 - Verify the image exists: docker images | grep {}\n\
                 - Check resource limits: memory={}, cpus={}",
                c.model_proxy_port, c.image, c.memory_limit, c.cpu_count
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Timeout during `docker run`: name the attempted image and limits and
    /// the likely causes, so the next action is clear without re-running.
    fn creation_timeout_error(&self) -> SandboxError {
        let c = &self.config;
        SandboxError::creation_timeout(
            c.startup_timeout(),
            format!(
                "start request for image {} (memory={}, cpus={}) did not return.\n\
                 This may indicate:\n\
                 - Docker daemon is overloaded\n\
                 - Network configuration issues\n\
                 - Image pull in progress (check: docker images)\n\
                 Consider increasing startup_timeout_secs in swebox.toml.",
                c.image, c.memory_limit, c.cpu_count
            ),
        )
    }

    /// Environment injected into the container: the model-endpoint base URL
    /// and key, then the configured extras (which may override them).
    fn injected_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(
            "OPENAI_API_BASE".to_string(),
            self.config.model_proxy_base_url(),
        );
        // Placeholder; the proxy does not authenticate.
        env.insert("OPENAI_API_KEY".to_string(), "swebox".to_string());
        env.extend(self.config.env_vars.clone());
        env
    }

    /// Run `cmd` inside the container under `bash -c`, waiting at most
    /// `timeout` (the configured execution timeout when `None`).
    ///
    /// A timeout is not an error: the result carries [`TIMEOUT_EXIT_CODE`]
    /// and a diagnostic naming the bound and a truncated view of the
    /// command. The inner process is not killed here; cleanup reclaims the
    /// container later.
    pub async fn exec(
        &self,
        cmd: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandResult, SandboxError> {
        let handle = self.handle.as_ref().ok_or_else(|| {
            SandboxError::handle_invalid("container not created or already cleaned up")
        })?;
        let timeout = timeout.unwrap_or_else(|| self.config.execution_timeout());

        let args = ["exec", handle.container_id.as_str(), "bash", "-c", cmd];
        match runtime::run_docker(&args, timeout).await? {
            Some(output) => Ok(command_result(&output)),
            None => {
                let preview: String = cmd.chars().take(100).collect();
                warn!(
                    "Command timed out after {}s: {preview}...",
                    timeout.as_secs()
                );
                Ok(CommandResult {
                    exit_code: TIMEOUT_EXIT_CODE,
                    stdout: String::new(),
                    stderr: format!(
                        "Command timed out after {}s: {preview}",
                        timeout.as_secs()
                    ),
                })
            }
        }
    }

    /// Run the agent tool against the active workspace: write the config
    /// artifact, invoke `sweagent run`, and return its result.
    pub async fn run_agent(&self, run: &AgentRun) -> Result<CommandResult, SandboxError> {
        let handle = self.handle.as_ref().ok_or_else(|| {
            SandboxError::handle_invalid("container not created or already cleaned up")
        })?;

        run.write_config(&handle.workspace)
            .await
            .map_err(|e| SandboxError::workspace_failed(e.to_string()))?;

        let cmd = run.command(&self.config.work_dir);
        let preview: String = cmd.chars().take(100).collect();
        info!("Running agent: {preview}...");

        let result = self.exec(&cmd, None).await?;
        info!("Agent completed with exit code {}", result.exit_code);
        Ok(result)
    }

    /// Recover the patch the task produced, if any. `Ok(None)` is the
    /// expected outcome for a no-op task.
    pub async fn extract_patch(&self, instance_id: &str) -> Result<Option<String>, SandboxError> {
        let handle = self.handle.as_ref().ok_or_else(|| {
            SandboxError::handle_invalid("container not created or already cleaned up")
        })?;

        let extractor = PatchExtractor::new(
            handle.workspace.join(AGENT_OUTPUT_DIR),
            Some(handle.workspace.clone()),
            instance_id,
        );
        extractor
            .extract()
            .await
            .map_err(|e| SandboxError::workspace_failed(e.to_string()))
    }

    /// Tear down the container and workspace, best-effort.
    ///
    /// Each step is attempted independently; failures are logged and never
    /// propagated, so flaky runtimes cannot wedge teardown. Idempotent:
    /// calling it twice is a no-op.
    pub async fn cleanup(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        let stop = ["stop", "-t", "5", handle.container_id.as_str()];
        let remove = ["rm", "-f", handle.container_id.as_str()];
        for step in [&stop[..], &remove[..]] {
            match runtime::run_docker(step, CLEANUP_STEP_TIMEOUT).await {
                Ok(Some(output)) if output.status.success() => {}
                Ok(Some(output)) => warn!(
                    "Cleanup step 'docker {}' failed: {}",
                    step.join(" "),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                Ok(None) => warn!("Cleanup step 'docker {}' timed out", step.join(" ")),
                Err(e) => warn!("Cleanup step 'docker {}' failed: {e}", step.join(" ")),
            }
        }
        info!(
            "Container {} removed",
            &handle.container_id[..12.min(handle.container_id.len())]
        );

        if handle.workspace.exists() {
            match tokio::fs::remove_dir_all(&handle.workspace).await {
                Ok(()) => debug!("Workspace removed: {}", handle.workspace.display()),
                Err(e) => warn!("Failed to remove workspace: {e}"),
            }
        }
    }

    /// End-to-end convenience: create, run the agent, extract the patch, and
    /// clean up on every path, including provisioning failures.
    pub async fn run_task(
        &mut self,
        repo_content: &BTreeMap<String, String>,
        run: &AgentRun,
    ) -> Result<TaskOutcome, SandboxError> {
        if let Err(e) = self.create(repo_content).await {
            self.cleanup().await;
            return Err(e);
        }

        let outcome = self.execute_task(run).await;
        self.cleanup().await;
        outcome
    }

    async fn execute_task(&self, run: &AgentRun) -> Result<TaskOutcome, SandboxError> {
        let result = self.run_agent(run).await?;
        let patch = self.extract_patch(&run.instance_id).await?;

        Ok(TaskOutcome {
            exit_code: result.exit_code,
            output: format!("{}{}", result.stdout, result.stderr),
            patch,
        })
    }
}

/// Map the docker client's captured output to a [`CommandResult`]. A client
/// killed by a signal has no exit code; that case gets [`SIGNAL_EXIT_CODE`]
/// and the wait status appended to stderr so it is not mistaken for the
/// command's own failure.
fn command_result(output: &std::process::Output) -> CommandResult {
    let mut stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = match output.status.code() {
        Some(code) => i64::from(code),
        None => {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!(
                "docker exec client exited abnormally: {}",
                output.status
            ));
            SIGNAL_EXIT_CODE
        }
    };

    CommandResult {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox_with(config: SandboxConfig) -> DockerSandbox {
        DockerSandbox::new(config)
    }

    #[test]
    fn test_command_result_timeout_sentinel() {
        let result = CommandResult {
            exit_code: TIMEOUT_EXIT_CODE,
            stdout: String::new(),
            stderr: "Command timed out after 5s: sleep 100".to_string(),
        };
        assert!(result.timed_out());
        assert!(!result.success());
    }

    #[test]
    fn test_validate_config_rejects_zero_cpus() {
        let sandbox = sandbox_with(SandboxConfig {
            cpu_count: 0,
            ..SandboxConfig::default()
        });
        let err = sandbox.validate_config().unwrap_err();
        assert!(err.to_string().contains("cpu count"));
    }

    #[test]
    fn test_validate_config_rejects_zero_timeouts() {
        let sandbox = sandbox_with(SandboxConfig {
            execution_timeout_secs: 0,
            ..SandboxConfig::default()
        });
        assert!(sandbox.validate_config().is_err());
    }

    #[test]
    fn test_validate_config_rejects_bad_memory() {
        let sandbox = sandbox_with(SandboxConfig {
            memory_limit: "plenty".to_string(),
            ..SandboxConfig::default()
        });
        let err = sandbox.validate_config().unwrap_err();
        assert!(err.to_string().contains("memory"));
    }

    #[test]
    fn test_validate_config_rejects_empty_network() {
        let sandbox = sandbox_with(SandboxConfig {
            network_mode: String::new(),
            ..SandboxConfig::default()
        });
        assert!(sandbox.validate_config().is_err());
    }

    #[test]
    fn test_creation_timeout_names_limits_and_causes() {
        let sandbox = sandbox_with(SandboxConfig {
            image: "custom:dev".to_string(),
            memory_limit: "4g".to_string(),
            cpu_count: 2,
            ..SandboxConfig::default()
        });
        let err = sandbox.creation_timeout_error();
        assert!(err.is_creation_timeout());

        let text = err.to_string();
        assert!(text.contains("60 seconds"));
        assert!(text.contains("custom:dev"));
        assert!(text.contains("memory=4g"));
        assert!(text.contains("cpus=2"));
        assert!(text.contains("Docker daemon is overloaded"));
        assert!(text.contains("startup_timeout_secs"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_result_for_signal_killed_client() {
        use std::os::unix::process::ExitStatusExt;

        // Raw wait status 9 = killed by SIGKILL, so code() is None.
        let output = std::process::Output {
            status: std::process::ExitStatus::from_raw(9),
            stdout: b"partial".to_vec(),
            stderr: b"oom\n".to_vec(),
        };

        let result = command_result(&output);
        assert_eq!(result.exit_code, SIGNAL_EXIT_CODE);
        assert!(!result.timed_out());
        assert_eq!(result.stdout, "partial");
        assert!(result.stderr.starts_with("oom\n"));
        assert!(result.stderr.contains("exited abnormally"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_result_for_normal_exit() {
        use std::os::unix::process::ExitStatusExt;

        // Raw wait status 0x100 = exited with code 1.
        let output = std::process::Output {
            status: std::process::ExitStatus::from_raw(0x100),
            stdout: Vec::new(),
            stderr: b"boom\n".to_vec(),
        };

        let result = command_result(&output);
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.stderr, "boom\n");
    }

    #[test]
    fn test_injected_env_contains_proxy_url() {
        let sandbox = sandbox_with(SandboxConfig::default());
        let env = sandbox.injected_env();
        assert_eq!(
            env.get("OPENAI_API_BASE").unwrap(),
            "http://127.0.0.1:8080/v1"
        );
        assert!(env.contains_key("OPENAI_API_KEY"));
    }

    #[test]
    fn test_injected_env_extras_override() {
        let mut config = SandboxConfig::default();
        config
            .env_vars
            .insert("OPENAI_API_KEY".to_string(), "custom".to_string());
        let sandbox = sandbox_with(config);
        assert_eq!(sandbox.injected_env().get("OPENAI_API_KEY").unwrap(), "custom");
    }

    #[tokio::test]
    async fn test_exec_without_create_is_handle_invalid() {
        let sandbox = sandbox_with(SandboxConfig::default());
        let err = sandbox.exec("echo hi", None).await.unwrap_err();
        assert!(err.is_handle_invalid());
    }

    #[tokio::test]
    async fn test_extract_without_create_is_handle_invalid() {
        let sandbox = sandbox_with(SandboxConfig::default());
        let err = sandbox.extract_patch("inst").await.unwrap_err();
        assert!(err.is_handle_invalid());
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent_without_container() {
        let mut sandbox = sandbox_with(SandboxConfig::default());
        sandbox.cleanup().await;
        sandbox.cleanup().await;
        assert!(sandbox.handle().is_none());
    }

    #[tokio::test]
    async fn test_exec_after_cleanup_fails_fast() {
        let mut sandbox = sandbox_with(SandboxConfig::default());
        sandbox.cleanup().await;
        let err = sandbox.exec("true", None).await.unwrap_err();
        assert!(err.is_handle_invalid());
    }
}
