//! Integration test: running real scripts through [`ProcessBackend`].
//!
//! Scripts are written to a temporary directory and run through `/bin/sh`
//! so the tests do not depend on executable bits.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use scriptgate_executor::{ExecutorError, Invocation, ProcessBackend, ScriptBackend};
use tempfile::TempDir;

fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))
        .unwrap_or_else(|e| panic!("write {name}: {e}"));
    path
}

fn temp_dir() -> TempDir {
    tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"))
}

#[tokio::test]
async fn echo_script_receives_positional_arguments() {
    let dir = temp_dir();
    let script = write_script(&dir, "echo.sh", r#"echo "$1 $2""#);
    let inv = Invocation::new("/bin/sh")
        .with_args([script.display().to_string(), "mydb".to_owned(), "aGVsbG8=".to_owned()]);

    let output = ProcessBackend::new()
        .invoke(&inv)
        .await
        .unwrap_or_else(|e| panic!("invoke failed: {e}"));

    assert_eq!(output.combined_lossy(), "mydb aGVsbG8=\n");
    assert!(output.status.success());
}

#[tokio::test]
async fn arguments_are_not_shell_interpreted() {
    let dir = temp_dir();
    let marker = dir.path().join("pwned");
    let script = write_script(&dir, "echo.sh", r#"printf '%s' "$1""#);
    let hostile = format!("; touch {}", marker.display());
    let inv = Invocation::new("/bin/sh").with_args([script.display().to_string(), hostile.clone()]);

    let output = ProcessBackend::new()
        .invoke(&inv)
        .await
        .unwrap_or_else(|e| panic!("invoke failed: {e}"));

    assert_eq!(output.combined_lossy(), hostile, "argument must arrive verbatim");
    assert!(!marker.exists(), "argument must never reach a shell");
}

#[tokio::test]
async fn working_directory_is_applied() {
    let dir = temp_dir();
    let inv = Invocation::new("/bin/sh").with_args(["-c", "pwd"]).with_working_dir(dir.path());

    let output = ProcessBackend::new()
        .invoke(&inv)
        .await
        .unwrap_or_else(|e| panic!("invoke failed: {e}"));

    let reported = PathBuf::from(output.stdout_lossy().trim());
    let expected = dir.path().canonicalize().unwrap_or_else(|e| panic!("canonicalize: {e}"));
    let reported = reported.canonicalize().unwrap_or_else(|e| panic!("canonicalize: {e}"));
    assert_eq!(reported, expected);
}

#[tokio::test]
async fn deadline_also_kills_grandchildren() {
    let dir = temp_dir();
    let pid_file = dir.path().join("sleeper.pid");
    let script = write_script(
        &dir,
        "hang.sh",
        &format!("sleep 30 &\necho $! > {}\nwait", pid_file.display()),
    );
    let inv = Invocation::new("/bin/sh")
        .with_args([script.display().to_string()])
        .with_deadline(Duration::from_millis(500));

    let start = Instant::now();
    let result = ProcessBackend::new().invoke(&inv).await;
    assert!(
        matches!(result, Err(ExecutorError::TimedOut { .. })),
        "expected TimedOut, got {result:?}"
    );
    assert!(start.elapsed() < Duration::from_secs(5), "deadline not enforced");

    let pid = std::fs::read_to_string(&pid_file).unwrap_or_else(|e| panic!("pid file: {e}"));
    // Give the kernel a moment to deliver SIGKILL and the init process to reap.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let proc_entry = PathBuf::from(format!("/proc/{}/stat", pid.trim()));
    if let Ok(stat) = std::fs::read_to_string(&proc_entry) {
        assert!(stat.contains(" Z "), "background sleep survived the deadline: {stat}");
    }
}

#[tokio::test]
async fn dropping_the_future_kills_the_child() {
    let dir = temp_dir();
    let pid_file = dir.path().join("script.pid");
    let script = write_script(&dir, "slow.sh", &format!("echo $$ > {}\nsleep 30", pid_file.display()));
    let inv = Invocation::new("/bin/sh").with_args([script.display().to_string()]);

    let backend = ProcessBackend::new();
    let outcome = tokio::time::timeout(Duration::from_millis(500), backend.invoke(&inv)).await;
    assert!(outcome.is_err(), "script should still be running when cancelled");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let pid = std::fs::read_to_string(&pid_file).unwrap_or_else(|e| panic!("pid file: {e}"));
    let proc_entry = PathBuf::from(format!("/proc/{}/stat", pid.trim()));
    if let Ok(stat) = std::fs::read_to_string(&proc_entry) {
        assert!(stat.contains(" Z "), "cancelled script still running: {stat}");
    }
}

#[tokio::test]
async fn stdout_is_kept_separately_for_fixed_scripts() {
    let dir = temp_dir();
    let script = write_script(&dir, "version.sh", "echo '{\"version\":\"16.2\"}'\necho notice >&2");
    let inv = Invocation::new("/bin/sh").with_args([script.display().to_string()]);

    let output = ProcessBackend::new()
        .invoke(&inv)
        .await
        .unwrap_or_else(|e| panic!("invoke failed: {e}"));

    assert_eq!(output.stdout, b"{\"version\":\"16.2\"}\n");
    assert!(output.combined_lossy().contains("notice"));
}
