//! Container runtime availability checks and image management.
//!
//! Everything here shells out to the docker CLI with argument vectors (no
//! string-assembled shell commands). Exit code 0 means success; non-zero
//! carries the runtime's stderr verbatim into the returned error.

use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::SandboxError;

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const IMAGE_INSPECT_TIMEOUT: Duration = Duration::from_secs(30);
// Image builds are rare and expensive; give them a long fixed ceiling.
const IMAGE_BUILD_TIMEOUT: Duration = Duration::from_secs(600);

/// Runs `docker` with the given arguments, bounded by `timeout`.
///
/// Returns `Ok(None)` when the wait elapsed before the process finished.
pub(crate) async fn run_docker(
    args: &[&str],
    timeout: Duration,
) -> Result<Option<Output>, SandboxError> {
    debug!("docker {}", args.join(" "));

    let child = tokio::process::Command::new("docker")
        .args(args)
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => Ok(Some(output)),
        Ok(Err(e)) => Err(SandboxError::runtime_unavailable(format!(
            "Failed to spawn docker: {e}.\n\
             \n\
             Please ensure:\n\
             1. Docker is installed (run: docker --version)\n\
             2. The docker binary is on PATH"
        ))),
        Err(_) => Ok(None),
    }
}

/// Check whether the docker daemon is reachable.
pub async fn runtime_available() -> bool {
    match run_docker(&["version"], VERSION_CHECK_TIMEOUT).await {
        Ok(Some(output)) => output.status.success(),
        Ok(None) => {
            warn!("docker version check timed out");
            false
        }
        Err(e) => {
            warn!("Docker not available: {e}");
            false
        }
    }
}

/// Fails with `RuntimeUnavailable` (including remediation steps) if the
/// daemon cannot be reached.
pub async fn ensure_runtime_available() -> Result<(), SandboxError> {
    if runtime_available().await {
        return Ok(());
    }

    Err(SandboxError::runtime_unavailable(
        "Docker is not available. Please ensure:\n\
         1. Docker is installed (run: docker --version)\n\
         2. Docker daemon is running (run: docker ps)\n\
         3. If running in a container, mount the Docker socket:\n\
            -v /var/run/docker.sock:/var/run/docker.sock\n\
         4. The docker binary is accessible:\n\
            -v /usr/bin/docker:/usr/bin/docker",
    ))
}

/// Check whether `image` exists locally.
pub async fn image_exists(image: &str) -> bool {
    match run_docker(&["image", "inspect", image], IMAGE_INSPECT_TIMEOUT).await {
        Ok(Some(output)) => output.status.success(),
        _ => false,
    }
}

/// Build `image` from the Dockerfile in `context_dir`.
///
/// Single attempt, no retry: a failed build in this environment usually
/// needs operator attention, so the error is surfaced as fatal.
pub async fn build_image(image: &str, context_dir: &Path) -> Result<(), SandboxError> {
    let dockerfile = context_dir.join("Dockerfile");
    if !dockerfile.exists() {
        return Err(SandboxError::image_unavailable(
            image,
            format!(
                "Dockerfile not found at {}. \
                 Build the image manually or point build_context at a directory containing one.",
                dockerfile.display()
            ),
        ));
    }

    let context = context_dir.display().to_string();
    info!("Building image {image} from {context}...");

    let output = run_docker(&["build", "-t", image, context.as_str()], IMAGE_BUILD_TIMEOUT)
        .await?
        .ok_or_else(|| {
            SandboxError::image_build_failed(
                image,
                format!(
                    "build did not finish within {} seconds",
                    IMAGE_BUILD_TIMEOUT.as_secs()
                ),
            )
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SandboxError::image_build_failed(image, stderr.to_string()));
    }

    info!("Image {image} built successfully");
    Ok(())
}

/// Ensure `image` is present, building it on demand when a build context is
/// configured. A missing image with no build context is fatal.
pub async fn ensure_image_available(
    image: &str,
    build_context: Option<&Path>,
) -> Result<(), SandboxError> {
    if image_exists(image).await {
        return Ok(());
    }

    match build_context {
        Some(context) => {
            warn!("Image {image} not found, attempting to build...");
            build_image(image, context).await
        }
        None => Err(SandboxError::image_unavailable(
            image,
            format!(
                "image not found locally and no build_context is configured.\n\
                 Verify it exists: docker images | grep {image}\n\
                 Or pull/build it manually."
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_image_exists_returns_false_for_bogus_image() {
        if !runtime_available().await {
            return; // Docker not available - skip
        }
        assert!(!image_exists("swebox-test-nonexistent:never").await);
    }

    #[tokio::test]
    async fn test_build_image_without_dockerfile_fails() {
        let dir = tempdir().unwrap();
        let err = build_image("swebox-test:none", dir.path())
            .await
            .unwrap_err();
        assert!(err.is_image_error());
        assert!(err.to_string().contains("Dockerfile not found"));
    }

    #[tokio::test]
    async fn test_ensure_image_without_context_is_fatal() {
        if !runtime_available().await {
            return; // Docker not available - skip
        }
        let err = ensure_image_available("swebox-test-nonexistent:never", None)
            .await
            .unwrap_err();
        assert!(err.is_image_error());
        assert!(err.to_string().contains("no build_context"));
    }
}
