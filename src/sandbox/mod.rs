//! Docker sandbox for isolated agent execution.
//!
//! Provides container-based isolation for running coding agents with
//! resource limits, bounded command execution, and best-effort teardown.

mod docker;
mod error;
pub mod runtime;

pub use docker::{
    CommandResult, DockerSandbox, SandboxHandle, TaskOutcome, SIGNAL_EXIT_CODE, TIMEOUT_EXIT_CODE,
};
pub use error::SandboxError;
