//! Sandbox configuration.
//!
//! [`SandboxConfig`] is a plain data holder: it carries the image identity,
//! resource caps, timeouts, network mode, and the model-proxy endpoint the
//! agent inside the container must reach. Values are validated when the
//! sandbox is created, not when the config is built, so partially-filled
//! configs can exist before use.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "swebox.toml";

/// Configuration for one sandbox instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Docker image to run the agent in.
    #[serde(default = "default_image")]
    pub image: String,

    /// Memory limit passed to the runtime (e.g. "8g", "512m").
    #[serde(default = "default_memory")]
    pub memory_limit: String,

    /// Number of CPUs the container may use.
    #[serde(default = "default_cpus")]
    pub cpu_count: u32,

    /// Seconds to wait for the container to start.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,

    /// Seconds to wait for an in-container command (the agent run).
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_secs: u64,

    /// Docker network mode. "host" lets the agent reach a locally bound
    /// model proxy without extra wiring.
    #[serde(default = "default_network_mode")]
    pub network_mode: String,

    /// Working directory inside the container; the workspace is bind-mounted
    /// here.
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    /// Host where the model-serving proxy listens.
    #[serde(default = "default_proxy_host")]
    pub model_proxy_host: String,

    /// Port where the model-serving proxy listens.
    #[serde(default = "default_proxy_port")]
    pub model_proxy_port: u16,

    /// Extra environment variables injected into the container.
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,

    /// Directory containing a Dockerfile for the on-demand image build.
    /// If unset, a missing image is fatal.
    #[serde(default)]
    pub build_context: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            memory_limit: default_memory(),
            cpu_count: default_cpus(),
            startup_timeout_secs: default_startup_timeout(),
            execution_timeout_secs: default_execution_timeout(),
            network_mode: default_network_mode(),
            work_dir: default_work_dir(),
            model_proxy_host: default_proxy_host(),
            model_proxy_port: default_proxy_port(),
            env_vars: BTreeMap::new(),
            build_context: None,
        }
    }
}

fn default_image() -> String {
    "swebox-agent:latest".to_string()
}

fn default_memory() -> String {
    "8g".to_string()
}

fn default_cpus() -> u32 {
    4
}

fn default_startup_timeout() -> u64 {
    60
}

fn default_execution_timeout() -> u64 {
    1800
}

fn default_network_mode() -> String {
    "host".to_string()
}

fn default_work_dir() -> String {
    "/workspace".to_string()
}

fn default_proxy_host() -> String {
    "127.0.0.1".to_string()
}

fn default_proxy_port() -> u16 {
    8080
}

impl SandboxConfig {
    /// Load configuration from `swebox.toml` in `project_dir`, falling back
    /// to defaults if the file does not exist.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        Ok(config)
    }

    /// Container start timeout as a [`Duration`].
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Command execution timeout as a [`Duration`].
    #[must_use]
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    /// Base URL of the model-serving endpoint the agent calls.
    #[must_use]
    pub fn model_proxy_base_url(&self) -> String {
        format!(
            "http://{}:{}/v1",
            self.model_proxy_host, self.model_proxy_port
        )
    }
}

/// Parse a memory limit string (e.g. "8g", "512m") to bytes.
///
/// Used to validate the limit before it is handed to the runtime.
pub(crate) fn parse_memory_limit(limit: &str) -> Result<i64> {
    let limit = limit.to_lowercase();

    if let Some(num) = limit.strip_suffix('g') {
        let gigs: i64 = num.parse().context("Invalid memory limit")?;
        Ok(gigs * 1024 * 1024 * 1024)
    } else if let Some(num) = limit.strip_suffix('m') {
        let megs: i64 = num.parse().context("Invalid memory limit")?;
        Ok(megs * 1024 * 1024)
    } else {
        limit.parse().context("Invalid memory limit")
    }
}
