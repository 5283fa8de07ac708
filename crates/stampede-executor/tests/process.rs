//! Process executor against small stand-in binaries.

use stampede_core::{
    ExecutorType, ProcessExecutorConfig, RunConfig, StepContext, StepDescriptor,
};
use stampede_executor::{execute_step, ExecutorError, ProcessExecutor, Shutdown};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn context(binary_path: &str) -> StepContext {
    let config = RunConfig::default().with_process_executor(ProcessExecutorConfig {
        binary_path: binary_path.to_string(),
        script_path: "load.js".to_string(),
        binary_args: Vec::new(),
        otlp_export: None,
    });
    let step = StepDescriptor::new("spike")
        .with_async(true)
        .with_executor(ExecutorType::Process);
    StepContext::new("bench", step, config)
}

fn script(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("loadgen.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn test_successful_run() {
    execute_step(&ProcessExecutor::new(), context("echo"), &Shutdown::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failing_binary() {
    let result = execute_step(&ProcessExecutor::new(), context("false"), &Shutdown::new()).await;
    match result {
        Err(ExecutorError::ProcessFailed { status }) => assert!(!status.success()),
        other => panic!("expected process failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_binary() {
    let result = execute_step(
        &ProcessExecutor::new(),
        context("/nonexistent/loadgen"),
        &Shutdown::new(),
    )
    .await;
    assert!(matches!(result, Err(ExecutorError::Io(_))));
}

#[tokio::test]
async fn test_context_reaches_the_child() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("args.txt");
    let path = script(
        &dir,
        &format!(r#"printf '%s\n' "$@" > '{}'"#, out.display()),
    );

    execute_step(
        &ProcessExecutor::new(),
        context(path.to_str().unwrap()),
        &Shutdown::new(),
    )
    .await
    .unwrap();

    let written = std::fs::read_to_string(&out).unwrap();
    let args: Vec<&str> = written.lines().collect();
    assert_eq!(args[0], "run");
    assert_eq!(args[1], "load.js");
    let json = args[2].strip_prefix("-econtext=").unwrap();
    let received = StepContext::from_json(json).unwrap();
    assert_eq!(received.step_name(), "spike");
}

#[tokio::test]
async fn test_shutdown_terminates_the_child() {
    let dir = TempDir::new().unwrap();
    let path = script(&dir, "exec sleep 30");
    let shutdown = Shutdown::new();

    let stopper = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.stop();
    });

    let started = Instant::now();
    let result = execute_step(
        &ProcessExecutor::new(),
        context(path.to_str().unwrap()),
        &shutdown,
    )
    .await;

    assert!(matches!(result, Err(ExecutorError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_child_ignoring_sigterm_is_killed() {
    let dir = TempDir::new().unwrap();
    let path = script(&dir, "trap '' TERM\nwhile true; do sleep 0.1; done");
    let shutdown = Shutdown::new();

    let stopper = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.stop();
    });

    let executor = ProcessExecutor::new().with_grace_period(Duration::from_millis(200));
    let started = Instant::now();
    let result = execute_step(&executor, context(path.to_str().unwrap()), &shutdown).await;

    assert!(matches!(result, Err(ExecutorError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(10));
}
