//! Build execution, buffered or streaming, plus output directory reporting.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::sync::mpsc;

use super::process::{spawn_line_reader, OutputLine, OutputStream, RunLimits};
use super::registry::{ActiveProcessRecord, ProcessHandle, ProcessKind, ProcessRegistry};
use super::toolchain::CommandSpec;
use super::types::{BuildResult, BUILD_OUTPUT_DIR};
use crate::error::{LecternError, Result};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Trailing output lines reported by a buffered build.
const OUTPUT_TAIL_LINES: usize = 20;

/// Most recent lines within a byte budget; older lines fall off the front.
#[derive(Default)]
struct LineTail {
    lines: VecDeque<String>,
    bytes: usize,
    dropped: bool,
}

impl LineTail {
    fn push(&mut self, text: &str, max: usize) {
        self.lines.push_back(text.to_string());
        self.bytes += text.len() + 1;
        while self.bytes > max {
            match self.lines.pop_front() {
                Some(old) => {
                    self.bytes -= old.len() + 1;
                    self.dropped = true;
                }
                None => break,
            }
        }
    }

    fn last(&self, count: usize) -> impl Iterator<Item = &String> {
        self.lines.iter().skip(self.lines.len().saturating_sub(count))
    }

    fn joined(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Output gathered by a buffered run. Stderr has its own budget so the
/// diagnostics of a noisy failing build survive.
#[derive(Default)]
struct BufferedOutput {
    combined: LineTail,
    stderr: LineTail,
}

impl BufferedOutput {
    fn push(&mut self, line: &OutputLine, max: usize) {
        self.combined.push(&line.text, max);
        if line.stream == OutputStream::Stderr {
            self.stderr.push(&line.text, max);
        }
    }

    fn truncated(&self) -> bool {
        self.combined.dropped || self.stderr.dropped
    }
}

/// Runs the build for one lecture. The process is tracked in the registry
/// only while the call is in flight.
pub struct BuildRunner {
    registry: ProcessRegistry,
    lecture_id: String,
    lecture_path: PathBuf,
    limits: RunLimits,
}

impl BuildRunner {
    pub fn new(
        registry: ProcessRegistry,
        lecture_id: impl Into<String>,
        lecture_path: impl Into<PathBuf>,
        limits: RunLimits,
    ) -> Self {
        Self {
            registry,
            lecture_id: lecture_id.into(),
            lecture_path: lecture_path.into(),
            limits,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.lecture_path.join(BUILD_OUTPUT_DIR)
    }

    /// Run the build to completion with output captured, then report the
    /// output directory.
    pub async fn build(&self, spec: &CommandSpec) -> BuildResult {
        let mut output = BufferedOutput::default();
        let max = self.limits.max_buffer;

        let outcome = self.run(spec, |line| output.push(line, max)).await;
        match outcome {
            Ok(()) => {
                let mut result = BuildResult {
                    success: true,
                    ..Default::default()
                };
                result.messages.push(format!("Ran {}", spec.display()));
                result
                    .messages
                    .extend(output.combined.last(OUTPUT_TAIL_LINES).cloned());
                if output.truncated() {
                    result
                        .messages
                        .push("Build output exceeded the capture limit and was truncated".to_string());
                }
                self.report_output(&mut result);
                result
            }
            Err(LecternError::ProcessExit { command, code, .. }) => {
                let err = LecternError::ProcessExit {
                    command,
                    code,
                    stderr: output.stderr.joined().trim().to_string(),
                };
                tracing::error!("Build for {} failed: {}", self.lecture_id, err);
                BuildResult::failed(err.to_string())
            }
            Err(e) => {
                tracing::error!("Build for {} failed: {}", self.lecture_id, e);
                BuildResult::failed(e.to_string())
            }
        }
    }

    /// Run the build, appending every output line to the result as
    /// `[stdout] …` / `[stderr] …` and handing it to `on_line` as it arrives.
    pub async fn build_with_output<F>(&self, spec: &CommandSpec, mut on_line: F) -> BuildResult
    where
        F: FnMut(&OutputLine),
    {
        let mut result = BuildResult::default();
        let mut kept_stdout = 0usize;
        let mut kept_stderr = 0usize;
        let mut truncated = false;
        let max = self.limits.max_buffer;

        let outcome = self
            .run(spec, |line| {
                on_line(line);
                let (kept, list) = match line.stream {
                    OutputStream::Stdout => (&mut kept_stdout, &mut result.messages),
                    OutputStream::Stderr => (&mut kept_stderr, &mut result.errors),
                };
                if *kept + line.text.len() > max {
                    truncated = true;
                    return;
                }
                *kept += line.text.len();
                list.push(line.prefixed());
            })
            .await;

        if truncated {
            result
                .messages
                .push("Build output exceeded the capture limit and was truncated".to_string());
        }

        match outcome {
            Ok(()) => {
                result.success = true;
                self.report_output(&mut result);
            }
            Err(e) => {
                tracing::error!("Build for {} failed: {}", self.lecture_id, e);
                result.errors.push(e.to_string());
            }
        }
        result
    }

    /// Spawn, stream lines to `on_line` until both pipes close, then wait for
    /// exit. Everything is bounded by the build timeout; on expiry the process
    /// is force-killed.
    async fn run<F>(&self, spec: &CommandSpec, mut on_line: F) -> Result<()>
    where
        F: FnMut(&OutputLine),
    {
        let command = spec.display();
        tracing::info!("Building {}: {}", self.lecture_id, command);

        let mut child = spec
            .to_command(&self.lecture_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LecternError::ProcessLaunch {
                command: command.clone(),
                source,
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        spawn_line_reader(child.stdout.take(), OutputStream::Stdout, tx.clone());
        spawn_line_reader(child.stderr.take(), OutputStream::Stderr, tx);

        self.registry.register(ActiveProcessRecord::new(
            ProcessHandle::new(child),
            ProcessKind::Build,
            self.lecture_id.clone(),
        ));

        let deadline = tokio::time::sleep(self.limits.timeout);
        tokio::pin!(deadline);

        let waited = async {
            while let Some(line) = rx.recv().await {
                on_line(&line);
            }
            self.registry
                .wait_for_exit(&self.lecture_id, ProcessKind::Build, EXIT_POLL_INTERVAL)
                .await
        };

        let outcome = tokio::select! {
            status = waited => Some(status),
            _ = &mut deadline => None,
        };

        let record = self.registry.remove(&self.lecture_id, ProcessKind::Build);

        match outcome {
            None => {
                tracing::warn!(
                    "Build for {} timed out after {:?}, killing",
                    self.lecture_id,
                    self.limits.timeout
                );
                if let Some(mut record) = record {
                    record.handle.kill();
                }
                Err(LecternError::timeout(command, self.limits.timeout))
            }
            Some(None) => Err(anyhow::anyhow!("Build process was stopped before it finished").into()),
            Some(Some(status)) if status.success() => {
                tracing::info!("Build for {} finished", self.lecture_id);
                Ok(())
            }
            Some(Some(status)) => Err(LecternError::ProcessExit {
                command,
                code: status.code(),
                stderr: String::new(),
            }),
        }
    }

    /// Report the conventional output directory. An absent or empty directory
    /// leaves the result successful, with a warning and no output path.
    fn report_output(&self, result: &mut BuildResult) {
        let dir = self.output_dir();
        let mut entries: Vec<String> = match std::fs::read_dir(&dir) {
            Ok(read) => read
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().to_string())
                .collect(),
            Err(_) => Vec::new(),
        };

        if entries.is_empty() {
            tracing::warn!("Build output {} is missing or empty", dir.display());
            result.messages.push(format!(
                "Warning: build finished but {} is missing or empty",
                dir.display()
            ));
            return;
        }

        entries.sort();
        result.messages.push(format!("Build output: {}", dir.display()));
        result
            .messages
            .extend(entries.into_iter().map(|name| format!("  {}", name)));
        result.output_path = Some(dir);
    }
}
