//! External command invocation with captured, timeout-bounded output.
//!
//! The container engine is an opaque child process to this harness: the
//! runner owns stream capture and the wall-clock budget, nothing else.
//! Non-zero exit is returned as data — negative-path scenarios create
//! containers that are expected to fail and inspect the output themselves.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

use crate::errors::{HarnessError, Result};

/// How long to keep draining a stream after the child is gone. Bounded so
/// an orphaned grandchild holding the pipe open cannot stall the harness.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Outcome of one external invocation. `status` is `None` when the child
/// was killed before exiting on its own.
#[derive(Clone, Debug)]
pub struct ExitResult {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExitResult {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

pub struct ProcessRunner {
    results_dir: PathBuf,
    budget: Duration,
}

impl ProcessRunner {
    pub fn new(results_dir: impl Into<PathBuf>, budget: Duration) -> Self {
        ProcessRunner {
            results_dir: results_dir.into(),
            budget,
        }
    }

    /// Runs `command args...`, capturing both streams into memory and into
    /// `<sink>.stdout.log` / `<sink>.stderr.log` under the results
    /// directory. Capture files are rewritten per invocation.
    pub async fn run(&self, sink: &str, command: &str, args: &[&str]) -> Result<ExitResult> {
        if self.budget.is_zero() {
            return Err(HarnessError::Config(
                "process timeout must be positive".to_string(),
            ));
        }
        debug!(command, ?args, sink, "spawning");

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::process(command, "stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HarnessError::process(command, "stderr not captured"))?;
        let (stdout_task, stdout_buf) = spawn_reader(stdout);
        let (stderr_task, stderr_buf) = spawn_reader(stderr);

        let status = match timeout(self.budget, child.wait()).await {
            Ok(waited) => Some(waited?),
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                None
            }
        };

        // streams usually hit EOF right after exit; the grace period only
        // matters when something inherited the pipe
        let _ = timeout(DRAIN_GRACE, async {
            let _ = stdout_task.await;
            let _ = stderr_task.await;
        })
        .await;
        let stdout = String::from_utf8_lossy(&stdout_buf.lock().await).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_buf.lock().await).into_owned();
        self.write_sink(sink, "stdout", &stdout)?;
        self.write_sink(sink, "stderr", &stderr)?;

        match status {
            Some(status) => Ok(ExitResult {
                status: status.code(),
                stdout,
                stderr,
            }),
            None => Err(HarnessError::timeout(
                self.budget,
                HarnessError::process(
                    command,
                    format!(
                        "killed after budget; partial stdout: {stdout}; partial stderr: {stderr}"
                    ),
                ),
            )),
        }
    }

    pub fn sink_path(&self, sink: &str, stream: &str) -> PathBuf {
        self.results_dir.join(format!("{sink}.{stream}.log"))
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    fn write_sink(&self, sink: &str, stream: &str, contents: &str) -> Result<()> {
        std::fs::create_dir_all(&self.results_dir)?;
        std::fs::write(self.sink_path(sink, stream), contents)?;
        Ok(())
    }
}

/// Drains a stream into a shared buffer chunk by chunk, so partial output
/// is observable even when the stream never reaches EOF.
fn spawn_reader(
    mut stream: impl AsyncReadExt + Send + Unpin + 'static,
) -> (JoinHandle<()>, Arc<Mutex<Vec<u8>>>) {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let task_buf = Arc::clone(&buf);
    let handle = tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(read) => task_buf.lock().await.extend_from_slice(&chunk[..read]),
            }
        }
    });
    (handle, buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn captures_stdout_and_reports_exit_status() {
        let dir = tempdir().expect("tempdir");
        let runner = ProcessRunner::new(dir.path(), Duration::from_secs(10));
        let result = runner
            .run("echo-test", "sh", &["-c", "echo hello"])
            .await
            .expect("sh is available");
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
        assert!(result.stderr.is_empty());

        let captured =
            std::fs::read_to_string(runner.sink_path("echo-test", "stdout")).expect("sink file");
        assert_eq!(captured.trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_data_not_an_error() {
        let dir = tempdir().expect("tempdir");
        let runner = ProcessRunner::new(dir.path(), Duration::from_secs(10));
        let result = runner
            .run("fail-test", "sh", &["-c", "echo oops >&2; exit 3"])
            .await
            .expect("invocation itself succeeds");
        assert_eq!(result.status, Some(3));
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn overrunning_child_is_killed_with_partial_output() {
        let dir = tempdir().expect("tempdir");
        let runner = ProcessRunner::new(dir.path(), Duration::from_millis(300));
        let err = runner
            .run("hang-test", "sh", &["-c", "echo started; exec sleep 30"])
            .await
            .expect_err("must exceed the budget");
        match err {
            HarnessError::Timeout { last, .. } => {
                assert!(last.to_string().contains("started"));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_budget_is_a_configuration_error() {
        let dir = tempdir().expect("tempdir");
        let runner = ProcessRunner::new(dir.path(), Duration::ZERO);
        let err = runner
            .run("zero", "sh", &["-c", "true"])
            .await
            .expect_err("rejected");
        assert!(matches!(err, HarnessError::Config(_)));
    }
}
