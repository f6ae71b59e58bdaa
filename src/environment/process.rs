//! Running external commands: buffered capture under a timeout, and line
//! streaming for callers that want output as it arrives.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::toolchain::CommandSpec;
use crate::error::{LecternError, Result};

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

impl OutputLine {
    /// `[stdout] text` form used in result message lists.
    pub fn prefixed(&self) -> String {
        format!("[{}] {}", self.stream.label(), self.text)
    }
}

/// Bounds for a buffered run.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub timeout: Duration,
    /// Bytes retained per stream; the rest is drained and dropped.
    pub max_buffer: usize,
}

#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
}

impl CapturedOutput {
    /// Convert a non-zero exit into [`LecternError::ProcessExit`].
    pub fn into_result(self, command: &str) -> Result<Self> {
        if self.status.success() {
            Ok(self)
        } else {
            Err(LecternError::ProcessExit {
                command: command.to_string(),
                code: self.status.code(),
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Spawn `spec` in `cwd`, capture both streams and wait for exit.
///
/// The process is killed when `limits.timeout` elapses first. With
/// `passthrough` set, lines are also logged as they arrive.
pub async fn run_captured(
    spec: &CommandSpec,
    cwd: &Path,
    limits: RunLimits,
    passthrough: bool,
) -> Result<CapturedOutput> {
    let command = spec.display();
    tracing::debug!("Running {} in {}", command, cwd.display());

    let mut child = spec
        .to_command(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| LecternError::ProcessLaunch {
            command: command.clone(),
            source,
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let run = tokio::time::timeout(limits.timeout, async {
        let (status, out, err) = tokio::join!(
            child.wait(),
            read_limited(stdout, limits.max_buffer, passthrough.then_some(OutputStream::Stdout)),
            read_limited(stderr, limits.max_buffer, passthrough.then_some(OutputStream::Stderr)),
        );
        status.map(|status| (status, out, err))
    })
    .await;

    match run {
        Ok(Ok((status, (stdout, out_truncated), (stderr, err_truncated)))) => {
            if out_truncated || err_truncated {
                tracing::warn!(
                    "Output of {} exceeded {} bytes and was truncated",
                    command,
                    limits.max_buffer
                );
            }
            Ok(CapturedOutput {
                status,
                stdout,
                stderr,
                truncated: out_truncated || err_truncated,
            })
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => {
            tracing::warn!("{} timed out after {:?}, killing", command, limits.timeout);
            if let Err(e) = child.kill().await {
                tracing::debug!("Kill after timeout failed: {}", e);
            }
            Err(LecternError::timeout(command, limits.timeout))
        }
    }
}

/// Read a pipe to EOF, keeping at most `max` bytes.
async fn read_limited<R>(pipe: Option<R>, max: usize, passthrough: Option<OutputStream>) -> (String, bool)
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return (String::new(), false);
    };

    let mut reader = BufReader::new(pipe);
    let mut kept = Vec::new();
    let mut line = Vec::new();
    let mut truncated = false;

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Output read error: {}", e);
                break;
            }
        }

        if let Some(stream) = passthrough {
            let text = String::from_utf8_lossy(&line);
            tracing::info!("[{}] {}", stream.label(), text.trim_end());
        }

        let room = max.saturating_sub(kept.len());
        if line.len() > room {
            kept.extend_from_slice(&line[..room]);
            truncated = true;
        } else {
            kept.extend_from_slice(&line);
        }
    }

    (String::from_utf8_lossy(&kept).to_string(), truncated)
}

/// Forward every line of `pipe` to `tx`, decoded lossily.
///
/// The pipe is drained to EOF even after the receiver is gone, so the child
/// never sees a closed pipe.
pub fn spawn_line_reader<R>(
    pipe: Option<R>,
    stream: OutputStream,
    tx: mpsc::UnboundedSender<OutputLine>,
) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let pipe = pipe?;
    Some(tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        let mut forwarding = true;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if !forwarding {
                        continue;
                    }
                    let text = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    if tx.send(OutputLine { stream, text }).is_err() {
                        forwarding = false;
                    }
                }
                Err(e) => {
                    tracing::debug!("{} read error: {}", stream.label(), e);
                    break;
                }
            }
        }
    }))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").args(["-c", script])
    }

    fn limits() -> RunLimits {
        RunLimits {
            timeout: Duration::from_secs(10),
            max_buffer: 1024,
        }
    }

    #[tokio::test]
    async fn test_run_captured_collects_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_captured(&sh("echo out; echo err >&2"), dir.path(), limits(), false)
            .await
            .unwrap();

        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(!output.truncated);
    }

    #[tokio::test]
    async fn test_run_captured_runs_in_cwd_with_env() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh("echo $LECTERN_TEST_VALUE; ls").env("LECTERN_TEST_VALUE", "42");
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();

        let output = run_captured(&spec, dir.path(), limits(), false).await.unwrap();
        assert!(output.stdout.contains("42"));
        assert!(output.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_into_result_reports_exit_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_captured(&sh("echo broken >&2; exit 3"), dir.path(), limits(), false)
            .await
            .unwrap();

        let err = output.into_result("install").unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_run_captured_truncates_at_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let limits = RunLimits {
            timeout: Duration::from_secs(10),
            max_buffer: 16,
        };
        let output = run_captured(&sh("for i in 1 2 3 4 5 6 7 8; do echo line-$i; done"), dir.path(), limits, false)
            .await
            .unwrap();

        assert!(output.status.success());
        assert!(output.truncated);
        assert_eq!(output.stdout.len(), 16);
    }

    #[tokio::test]
    async fn test_run_captured_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let limits = RunLimits {
            timeout: Duration::from_millis(200),
            max_buffer: 1024,
        };
        let err = run_captured(&sh("sleep 30"), dir.path(), limits, false)
            .await
            .unwrap_err();

        assert!(matches!(err, LecternError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_run_captured_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("/nonexistent/lectern-tool");
        let err = run_captured(&spec, dir.path(), limits(), false).await.unwrap_err();
        assert!(matches!(err, LecternError::ProcessLaunch { .. }));
    }

    #[tokio::test]
    async fn test_spawn_line_reader_forwards_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut child = sh("printf 'a\\nb\\n'")
            .to_command(dir.path())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_line_reader(child.stdout.take(), OutputStream::Stdout, tx).unwrap();
        handle.await.unwrap();
        child.wait().await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.prefixed(), "[stdout] a");
        assert_eq!(rx.recv().await.unwrap().text, "b");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_spawn_line_reader_survives_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let mut child = sh("printf 'caf\\351\\r\\n'; sleep 0.2; echo after")
            .to_command(dir.path())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_line_reader(child.stdout.take(), OutputStream::Stdout, tx).unwrap();
        handle.await.unwrap();
        let status = child.wait().await.unwrap();

        assert!(status.success());
        assert_eq!(rx.recv().await.unwrap().text, "caf\u{FFFD}");
        assert_eq!(rx.recv().await.unwrap().text, "after");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_spawn_line_reader_drains_after_receiver_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut child = sh("echo first; sleep 0.2; for i in 1 2 3; do echo more-$i; done")
            .to_command(dir.path())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = spawn_line_reader(child.stdout.take(), OutputStream::Stdout, tx).unwrap();
        handle.await.unwrap();

        assert!(child.wait().await.unwrap().success());
    }
}
