//! Local interpreter backend (`fallback-mock`)
//!
//! Used only when Docker cannot be reached at startup. The submission still
//! runs in its own short-lived interpreter with a wall-clock timeout, a
//! scratch working directory and best-effort rlimits, but there is no
//! network or filesystem isolation. Every report produced through this
//! engine is tagged accordingly.
//!
//! Each worker leads its own process group; whatever the submission spawns
//! is killed with it.

use crate::cancel::CancelToken;
use crate::engine::{ExecutionEngine, Invocation, SandboxFault};
use crate::evaluator::TestExecutionOutput;
use crate::script::{decode_output, driver_args};
use async_trait::async_trait;
use candor_common::config::SandboxConfig;
use candor_common::types::ExecutionMode;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-invocation working directory, removed on drop
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create() -> std::io::Result<Self> {
        let path = std::env::temp_dir().join(format!("candor-{}", Uuid::new_v4()));
        std::fs::create_dir(&path)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove scratch directory");
        }
    }
}

/// SIGKILL every process in the worker's group
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pgid, error = %err, "Failed to kill worker process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

pub struct LocalEngine {
    python_bin: String,
    memory_limit_bytes: u64,
}

impl LocalEngine {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            python_bin: config.python_bin.clone(),
            memory_limit_bytes: config.memory_limit_bytes(),
        }
    }

    async fn run(&self, invocation: &Invocation<'_>, cancel: &CancelToken) -> Result<Value, SandboxFault> {
        let args = driver_args(invocation, Some(self.memory_limit_bytes))?;
        let scratch = ScratchDir::create().map_err(SandboxFault::backend)?;

        let mut command = Command::new(&self.python_bin);
        command
            .args(&args)
            .current_dir(scratch.path())
            .env_clear()
            .env("TMPDIR", scratch.path())
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        if let Some(path) = std::env::var_os("PATH") {
            command.env("PATH", path);
        }

        let child = command
            .spawn()
            .map_err(|e| SandboxFault::Backend(format!("failed to spawn {}: {}", self.python_bin, e)))?;
        let pid = child.id();

        // Dropping the wait future drops the child, and kill_on_drop reaps it
        let outcome = tokio::select! {
            output = child.wait_with_output() => {
                output.map_err(SandboxFault::backend).and_then(|output| {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    decode_output(&stdout, &stderr, output.status.code().map(i64::from))
                })
            }
            _ = tokio::time::sleep(Duration::from_millis(invocation.timeout_ms)) => {
                debug!(?pid, timeout_ms = invocation.timeout_ms, "Killing timed out worker");
                Err(SandboxFault::Timeout(invocation.timeout_ms))
            }
            _ = cancel.cancelled() => {
                debug!(?pid, "Killing cancelled worker");
                Err(SandboxFault::Cancelled)
            }
        };

        // Background processes left by the submission must not outlive it
        kill_group(pid);
        outcome
    }
}

#[async_trait]
impl ExecutionEngine for LocalEngine {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::FallbackMock
    }

    async fn execute(&self, invocation: &Invocation<'_>, cancel: &CancelToken) -> TestExecutionOutput {
        let started = Instant::now();
        let outcome = self.run(invocation, cancel).await;
        TestExecutionOutput::new(started.elapsed(), outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{run_test_suite, SuiteLimits};
    use candor_common::types::{
        CharBreakdown, ExecutionReport, FaultKind, ReportStatus, Submission, TestCase, TestStatus,
    };
    use serde_json::json;

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let scratch = ScratchDir::create().unwrap();
        let path = scratch.path().to_path_buf();
        assert!(path.is_dir());

        drop(scratch);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_backend_fault() {
        let mut config = SandboxConfig::from_env();
        config.python_bin = "/nonexistent/candor-python".to_string();
        let engine = LocalEngine::new(&config);

        let output = engine
            .execute(&Invocation::check("x = 1", 1000), &CancelToken::never())
            .await;

        assert!(matches!(output.outcome, Err(SandboxFault::Backend(_))));
    }

    // The tests below drive the real interpreter and are skipped without one

    fn python_engine(timeout_ms: u64) -> Option<(LocalEngine, SuiteLimits)> {
        let available = std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success());
        if !available {
            eprintln!("python3 not found, skipping");
            return None;
        }

        let mut config = SandboxConfig::from_env();
        config.python_bin = "python3".to_string();
        config.memory_limit_mb = 256;
        let limits = SuiteLimits {
            timeout_ms,
            max_source_bytes: config.max_source_bytes,
            max_parallel: 2,
        };
        Some((LocalEngine::new(&config), limits))
    }

    fn submission(source: &str) -> Submission {
        Submission {
            id: Uuid::new_v4(),
            candidate_id: 1,
            question_id: 1,
            source_code: source.to_string(),
            char_breakdown: CharBreakdown::default(),
            chat_response: None,
            deadline: None,
        }
    }

    async fn run(source: &str, cases: &[TestCase], timeout_ms: u64) -> Option<ExecutionReport> {
        let (engine, limits) = python_engine(timeout_ms)?;
        Some(run_test_suite(&engine, &submission(source), cases, &limits, &CancelToken::never()).await)
    }

    fn reverse_cases() -> Vec<TestCase> {
        vec![
            TestCase::scalar(json!("hello"), json!("olleh")),
            TestCase::scalar(json!(""), json!("")),
        ]
    }

    #[tokio::test]
    async fn test_driver_reverse_passes() {
        let Some(report) = run("def solution(s):\n    return s[::-1]\n", &reverse_cases(), 5000).await else {
            return;
        };

        assert_eq!(report.mode, ExecutionMode::FallbackMock);
        assert_eq!(report.tests_passed, 2);
        assert!(report.is_passed);
    }

    #[tokio::test]
    async fn test_driver_identity_fails_with_actual() {
        let Some(report) = run("def solution(s):\n    return s\n", &reverse_cases(), 5000).await else {
            return;
        };

        assert_eq!(report.tests_passed, 1);
        assert_eq!(report.results[0].status, TestStatus::Failed);
        assert_eq!(report.results[0].actual, Some(json!("hello")));
    }

    #[tokio::test]
    async fn test_driver_unpack_spreads_arguments() {
        let source = "def solution(*args):\n    return [len(args), list(args)]\n";
        let spread: TestCase =
            serde_json::from_value(json!({"input": [[1, 2, 3], -1], "expected": [2, [[1, 2, 3], -1]], "unpack": true}))
                .unwrap();
        let whole = TestCase::scalar(json!([1, 2, 3]), json!([1, [[1, 2, 3]]]));
        let Some(report) = run(source, &[spread, whole], 5000).await else {
            return;
        };

        assert_eq!(report.tests_passed, 2, "{:?}", report.results);
    }

    #[tokio::test]
    async fn test_driver_bool_matches_integer() {
        let cases = vec![TestCase::scalar(json!(4), json!(1))];
        let Some(report) = run("def solution(n):\n    return n % 2 == 0\n", &cases, 5000).await else {
            return;
        };

        assert_eq!(report.results[0].actual, Some(json!(true)));
        assert!(report.is_passed);
    }

    #[tokio::test]
    async fn test_driver_infinite_loop_times_out() {
        let source = "def solution(x):\n    while True:\n        pass\n";
        let cases = vec![TestCase::scalar(json!(1), json!(1))];
        let Some(report) = run(source, &cases, 500).await else {
            return;
        };

        assert_eq!(report.results[0].status, TestStatus::Error);
        assert_eq!(report.results[0].fault, Some(FaultKind::Timeout));
        assert!(report.complete);
    }

    #[tokio::test]
    async fn test_driver_syntax_error_short_circuits() {
        let Some(report) = run("def solution(s)\n    return s\n", &reverse_cases(), 5000).await else {
            return;
        };

        assert_eq!(report.status, ReportStatus::Error);
        assert!(report.results.iter().all(|r| r.fault == Some(FaultKind::Compile)));
        assert!(report
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("SyntaxError")));
    }

    #[tokio::test]
    async fn test_driver_memory_error_is_resource_fault() {
        let source = "def solution(n):\n    return [0] * n\n";
        let cases = vec![TestCase::scalar(json!(10_000_000_000u64), json!(0))];
        let Some(report) = run(source, &cases, 5000).await else {
            return;
        };

        assert_eq!(report.results[0].fault, Some(FaultKind::Resource));
    }

    #[cfg(target_os = "linux")]
    fn process_gone(pid: u32) -> bool {
        // A zombie waiting for its new parent to reap it counts as gone
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
                .is_some_and(|state| state == 'Z'),
            Err(_) => true,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_spawned_processes() {
        let Some((engine, _)) = python_engine(1000) else {
            return;
        };
        let pid_file = std::env::temp_dir().join(format!("candor-child-{}", Uuid::new_v4()));
        let source = format!(
            "import subprocess, sys\n\
             child = subprocess.Popen([sys.executable, '-c', 'import time; time.sleep(30)'])\n\
             open({:?}, 'w').write(str(child.pid))\n\
             def solution(x):\n    while True:\n        pass\n",
            pid_file.display().to_string()
        );

        let output = engine
            .execute(&Invocation::call(&source, "solution", vec![json!(1)], 1000), &CancelToken::never())
            .await;
        assert_eq!(output.outcome, Err(SandboxFault::Timeout(1000)));

        let pid: u32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        std::fs::remove_file(&pid_file).ok();
        let mut gone = false;
        for _ in 0..40 {
            if process_gone(pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "spawned process {} survived the worker", pid);
    }
}
