//! Development server lifecycle: spawn, readiness race, stop.
//!
//! `start` returns once readiness is decided while the server keeps running
//! in the background. Output produced after that point goes to the log.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::process::{spawn_line_reader, OutputLine, OutputStream};
use super::registry::{ActiveProcessRecord, ProcessHandle, ProcessKind, ProcessRegistry};
use super::toolchain::CommandSpec;
use super::types::DevServerResult;
use crate::error::LecternError;

/// Lines kept for the start result; later output is only logged.
const MAX_CAPTURED_LINES: usize = 500;

/// How long to wait for the output pipes to drain after an early exit.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Timing of the readiness probe.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    pub timeout: Duration,
    pub interval: Duration,
    pub connect_timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(1),
        }
    }
}

/// Outcome of racing process exit against port reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Reachable,
    Exited(ExitStatus),
    /// Neither condition observed in time; the process is left running.
    TimedOut,
    /// The registry entry vanished while waiting (stopped elsewhere).
    Untracked,
}

/// Output captured while `start` is waiting on readiness.
#[derive(Clone)]
struct OutputCapture {
    lines: Arc<Mutex<Option<Vec<OutputLine>>>>,
}

impl OutputCapture {
    fn new() -> Self {
        Self {
            lines: Arc::new(Mutex::new(Some(Vec::new()))),
        }
    }

    /// Consume lines from `rx`: kept until [`Self::finish`], logged always.
    fn forward(&self, mut rx: mpsc::UnboundedReceiver<OutputLine>, lecture_id: String) -> JoinHandle<()> {
        let capture = self.clone();
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                match line.stream {
                    OutputStream::Stdout => tracing::debug!("[{}] {}", lecture_id, line.text),
                    OutputStream::Stderr => tracing::warn!("[{}] {}", lecture_id, line.text),
                }
                let mut guard = capture.lines.lock().unwrap_or_else(|p| p.into_inner());
                if let Some(lines) = guard.as_mut() {
                    if lines.len() < MAX_CAPTURED_LINES {
                        lines.push(line);
                    }
                }
            }
        })
    }

    /// Stop capturing and hand back what was collected.
    fn finish(&self) -> Vec<OutputLine> {
        self.lines
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .unwrap_or_default()
    }
}

/// Dev server control for one lecture.
pub struct DevServerController {
    registry: ProcessRegistry,
    lecture_id: String,
    lecture_path: PathBuf,
    policy: ReadinessPolicy,
}

impl DevServerController {
    pub fn new(
        registry: ProcessRegistry,
        lecture_id: impl Into<String>,
        lecture_path: impl Into<PathBuf>,
        policy: ReadinessPolicy,
    ) -> Self {
        Self {
            registry,
            lecture_id: lecture_id.into(),
            lecture_path: lecture_path.into(),
            policy,
        }
    }

    /// Spawn `spec` and wait until it accepts connections on `host:port`,
    /// exits, or the readiness timeout passes.
    ///
    /// Any previously tracked dev server for this lecture is stopped first.
    pub async fn start(&self, spec: &CommandSpec, host: &str, port: u16) -> DevServerResult {
        if self.stop() {
            tracing::info!("Stopped previous dev server for {}", self.lecture_id);
        }

        let command = spec.display();
        tracing::info!("Starting dev server for {}: {}", self.lecture_id, command);

        let spawned = spec
            .to_command(&self.lecture_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                let err = LecternError::ProcessLaunch { command, source };
                tracing::error!("{}", err);
                return DevServerResult::failed(err.to_string());
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        spawn_line_reader(child.stdout.take(), OutputStream::Stdout, tx.clone());
        spawn_line_reader(child.stderr.take(), OutputStream::Stderr, tx);
        let capture = OutputCapture::new();
        let forwarder = capture.forward(rx, self.lecture_id.clone());

        let handle = ProcessHandle::new(child);
        let pid = handle.pid();
        tracing::info!("Dev server for {} spawned (pid {:?})", self.lecture_id, pid);
        self.registry.register(ActiveProcessRecord::new(
            handle,
            ProcessKind::DevServer,
            self.lecture_id.clone(),
        ));

        let readiness = self.await_readiness(host, port).await;
        if matches!(readiness, Readiness::Exited(_)) {
            // Let the readers hit EOF so the diagnostics are complete.
            let _ = tokio::time::timeout(DRAIN_TIMEOUT, forwarder).await;
        }

        let mut result = DevServerResult::default();
        for line in capture.finish() {
            match line.stream {
                OutputStream::Stdout => result.messages.push(line.text),
                OutputStream::Stderr => result.errors.push(line.text),
            }
        }

        if matches!(readiness, Readiness::Exited(_)) {
            // Already reaped; nothing left to stop.
            self.registry.remove(&self.lecture_id, ProcessKind::DevServer);
        }

        let url = format!("http://{}:{}", host, port);
        match readiness {
            Readiness::Reachable => {
                tracing::info!("Dev server for {} ready at {}", self.lecture_id, url);
                result.messages.push(format!("Dev server ready at {}", url));
            }
            Readiness::TimedOut => {
                tracing::warn!(
                    "Dev server for {} not reachable after {:?}, assuming it is still starting",
                    self.lecture_id,
                    self.policy.timeout
                );
                result.messages.push(format!(
                    "Dev server not reachable after {:?}; it may still be starting",
                    self.policy.timeout
                ));
            }
            Readiness::Exited(status) if status.success() => {
                tracing::warn!("Dev server for {} exited before accepting connections", self.lecture_id);
                result
                    .messages
                    .push("Dev server exited before accepting connections".to_string());
            }
            Readiness::Exited(status) => {
                tracing::error!("Dev server for {} exited with {}", self.lecture_id, status);
                result.errors.push(match status.code() {
                    Some(code) => format!("Dev server exited with code {}", code),
                    None => format!("Dev server terminated: {}", status),
                });
                return result;
            }
            Readiness::Untracked => {
                result
                    .errors
                    .push("Dev server was stopped before it became ready".to_string());
                return result;
            }
        }

        result.success = true;
        result.url = Some(url);
        result.process_id = pid;
        result
    }

    /// Race process exit against a TCP connect to `host:port`.
    ///
    /// Dropping the probe future on either outcome also drops its timer.
    pub async fn await_readiness(&self, host: &str, port: u16) -> Readiness {
        let probe = async {
            let mut ticker = tokio::time::interval(self.policy.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.registry.exit_status(&self.lecture_id, ProcessKind::DevServer) {
                    None => return Readiness::Untracked,
                    Some(Some(status)) => return Readiness::Exited(status),
                    Some(None) => {}
                }
                if port_reachable(host, port, self.policy.connect_timeout).await {
                    return Readiness::Reachable;
                }
            }
        };

        match tokio::time::timeout(self.policy.timeout, probe).await {
            Ok(readiness) => readiness,
            Err(_) => Readiness::TimedOut,
        }
    }

    /// Terminate the tracked dev server. `false` when none is tracked.
    pub fn stop(&self) -> bool {
        self.registry.stop(&self.lecture_id, ProcessKind::DevServer)
    }

    pub fn is_running(&self) -> bool {
        self.registry
            .is_running(&self.lecture_id, ProcessKind::DevServer)
    }

    pub fn pid(&self) -> Option<u32> {
        self.registry.pid(&self.lecture_id, ProcessKind::DevServer)
    }
}

async fn port_reachable(host: &str, port: u16, connect_timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(connect_timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}
