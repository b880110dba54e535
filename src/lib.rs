//! Disposable Docker sandboxes for autonomous coding agents.
//!
//! One [`sandbox::DockerSandbox`] owns the full lifecycle of a single
//! container: provision it against a seeded, version-controlled workspace,
//! run the agent tool inside it under timeouts, recover the resulting patch,
//! and tear everything down. Fleet-level scheduling is the caller's job;
//! instantiate one sandbox per task.

pub mod agent;
pub mod config;
pub mod dataset;
pub mod patch;
pub mod reward;
pub mod sandbox;
pub mod workspace;

pub use config::SandboxConfig;
pub use patch::PatchExtractor;
pub use sandbox::{CommandResult, DockerSandbox, SandboxError, SandboxHandle};
