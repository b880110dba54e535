//! Domain-specific error types for sandbox operations.
//!
//! Typed errors enable callers to match on specific failure modes
//! rather than parsing error message strings. Every fatal variant carries
//! enough detail (image, limits, underlying stderr) to diagnose without
//! re-running.

use std::time::Duration;

/// Errors that can occur during sandbox provisioning and teardown.
///
/// Command failures inside a live container are not errors; they come back
/// as a [`crate::sandbox::CommandResult`] with a non-zero exit code.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The container runtime is not running or not accessible.
    #[error("Container runtime is not available: {message}")]
    RuntimeUnavailable { message: String },

    /// The image was not found and could not be built on demand.
    #[error("Container image unavailable: {image}: {message}")]
    ImageUnavailable { image: String, message: String },

    /// The on-demand image build ran but failed.
    #[error("Image build failed for {image}: {message}")]
    ImageBuildFailed { image: String, message: String },

    /// Container start did not complete within the startup timeout.
    #[error("Container creation timed out after {timeout_secs} seconds: {message}")]
    CreationTimeout { timeout_secs: u64, message: String },

    /// The runtime rejected the start request (conflicting name, invalid
    /// resource spec, port conflict).
    #[error("Container creation failed: {message}")]
    CreationFailed { message: String },

    /// Operation attempted on a handle that was never created or has
    /// already been cleaned up.
    #[error("Sandbox handle is invalid: {message}")]
    HandleInvalid { message: String },

    /// Workspace seeding or baseline commit failed.
    #[error("Workspace preparation failed: {message}")]
    WorkspaceFailed { message: String },
}

impl SandboxError {
    /// Creates a `RuntimeUnavailable` error with operator remediation steps.
    pub fn runtime_unavailable(message: impl Into<String>) -> Self {
        Self::RuntimeUnavailable {
            message: message.into(),
        }
    }

    /// Creates an `ImageUnavailable` error.
    pub fn image_unavailable(image: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ImageUnavailable {
            image: image.into(),
            message: message.into(),
        }
    }

    /// Creates an `ImageBuildFailed` error.
    pub fn image_build_failed(image: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ImageBuildFailed {
            image: image.into(),
            message: message.into(),
        }
    }

    /// Creates a `CreationTimeout` error from a `Duration` and a message
    /// describing what was attempted and the likely causes.
    pub fn creation_timeout(duration: Duration, message: impl Into<String>) -> Self {
        Self::CreationTimeout {
            timeout_secs: duration.as_secs(),
            message: message.into(),
        }
    }

    /// Creates a `CreationFailed` error.
    pub fn creation_failed(message: impl Into<String>) -> Self {
        Self::CreationFailed {
            message: message.into(),
        }
    }

    /// Creates a `HandleInvalid` error.
    pub fn handle_invalid(message: impl Into<String>) -> Self {
        Self::HandleInvalid {
            message: message.into(),
        }
    }

    /// Creates a `WorkspaceFailed` error.
    pub fn workspace_failed(message: impl Into<String>) -> Self {
        Self::WorkspaceFailed {
            message: message.into(),
        }
    }

    /// Returns true if this is a runtime unavailability error.
    pub fn is_runtime_unavailable(&self) -> bool {
        matches!(self, Self::RuntimeUnavailable { .. })
    }

    /// Returns true if this error concerns the image (missing or unbuildable).
    pub fn is_image_error(&self) -> bool {
        matches!(
            self,
            Self::ImageUnavailable { .. } | Self::ImageBuildFailed { .. }
        )
    }

    /// Returns true if this is a creation timeout.
    pub fn is_creation_timeout(&self) -> bool {
        matches!(self, Self::CreationTimeout { .. })
    }

    /// Returns true if this is an invalid handle error.
    pub fn is_handle_invalid(&self) -> bool {
        matches!(self, Self::HandleInvalid { .. })
    }
}
