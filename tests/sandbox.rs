//! End-to-end sandbox tests.
//!
//! These exercise the full lifecycle against a real Docker daemon and are
//! skipped when docker (or the test image) is unavailable, so they can run
//! in any environment without special setup.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use swebox::sandbox::{runtime, DockerSandbox, TIMEOUT_EXIT_CODE};
use swebox::SandboxConfig;

/// A small image that is realistically present or cheaply pullable; tests
/// skip when it is missing rather than pulling it themselves.
const TEST_IMAGE: &str = "debian:stable-slim";

async fn docker_ready() -> bool {
    runtime::runtime_available().await && runtime::image_exists(TEST_IMAGE).await
}

fn test_config() -> SandboxConfig {
    SandboxConfig {
        image: TEST_IMAGE.to_string(),
        memory_limit: "512m".to_string(),
        cpu_count: 1,
        startup_timeout_secs: 60,
        execution_timeout_secs: 60,
        ..SandboxConfig::default()
    }
}

#[tokio::test]
async fn test_create_exec_extract_cleanup() {
    if !docker_ready().await {
        return; // Docker or test image not available - skip
    }

    let mut content = BTreeMap::new();
    content.insert("a.py".to_string(), "x=1\n".to_string());

    let mut sandbox = DockerSandbox::new(test_config());
    let handle = sandbox.create(&content).await.unwrap();
    assert!(!handle.container_id.is_empty());
    assert!(handle.container_name.starts_with("swebox-"));
    assert!(handle.workspace.join("a.py").exists());

    // Sequential execs observe each other's filesystem effects: the write
    // lands in the bind-mounted workspace the extractor diffs afterwards.
    let result = sandbox.exec("echo x=2 > a.py", None).await.unwrap();
    assert!(result.success(), "exec failed: {}", result.stderr);
    let check = sandbox.exec("cat a.py", None).await.unwrap();
    assert!(check.stdout.contains("x=2"));

    let patch = sandbox.extract_patch("task").await.unwrap().unwrap();
    assert!(patch.contains("a.py"));

    let workspace = handle.workspace.clone();
    sandbox.cleanup().await;
    assert!(!workspace.exists());

    // Idempotent: a second cleanup is a no-op.
    sandbox.cleanup().await;
    assert!(sandbox.handle().is_none());
}

#[tokio::test]
async fn test_empty_task_extracts_absence() {
    if !docker_ready().await {
        return; // Docker or test image not available - skip
    }

    let mut sandbox = DockerSandbox::new(test_config());
    sandbox.create(&BTreeMap::new()).await.unwrap();

    let patch = sandbox.extract_patch("task").await.unwrap();
    assert!(patch.is_none());

    sandbox.cleanup().await;
}

#[tokio::test]
async fn test_exec_timeout_returns_sentinel_within_bound() {
    if !docker_ready().await {
        return; // Docker or test image not available - skip
    }

    let mut sandbox = DockerSandbox::new(test_config());
    sandbox.create(&BTreeMap::new()).await.unwrap();

    let started = Instant::now();
    let result = sandbox
        .exec("sleep 30", Some(Duration::from_secs(2)))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
    assert!(result.timed_out());
    assert!(result.stderr.contains("timed out after 2s"));
    assert!(result.stderr.contains("sleep 30"));
    // Returned within a bounded margin of the requested timeout.
    assert!(elapsed < Duration::from_secs(10));

    sandbox.cleanup().await;
}

#[tokio::test]
async fn test_runtime_unavailable_reported_before_workspace_mutation() {
    // Independent of docker availability: a bogus image with no build
    // context must fail during provisioning, and cleanup afterwards must
    // not leave anything behind.
    let mut sandbox = DockerSandbox::new(SandboxConfig {
        image: "swebox-test-nonexistent:never".to_string(),
        ..test_config()
    });

    let err = sandbox.create(&BTreeMap::new()).await.unwrap_err();
    assert!(err.is_runtime_unavailable() || err.is_image_error());
    assert!(sandbox.handle().is_none());

    sandbox.cleanup().await;
}
