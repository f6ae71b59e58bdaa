//! In-memory registry of external processes, at most one per lecture and kind.

use std::collections::HashMap;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::Child;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    DevServer,
    Build,
}

impl std::fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DevServer => f.write_str("dev-server"),
            Self::Build => f.write_str("build"),
        }
    }
}

/// Opaque owner of a spawned OS process.
///
/// Never cloned; it lives inside exactly one registry entry and only exposes
/// the pid, an exit query and termination.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    exit: Option<ExitStatus>,
}

impl ProcessHandle {
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child,
            pid,
            exit: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status if the process has already exited. Never blocks.
    pub fn exit_status(&mut self) -> Option<ExitStatus> {
        if self.exit.is_none() {
            match self.child.try_wait() {
                Ok(status) => self.exit = status,
                Err(e) => tracing::debug!("try_wait failed for pid {:?}: {}", self.pid, e),
            }
        }
        self.exit
    }

    /// Request termination without waiting for the process to go away.
    ///
    /// Windows has no signal semantics for child trees, so the whole tree is
    /// force-killed by pid. Elsewhere SIGTERM is sent, and SIGKILL only if
    /// sending SIGTERM itself fails.
    pub fn terminate(&mut self) -> bool {
        if self.exit_status().is_some() {
            return true;
        }
        let Some(pid) = self.pid else {
            return self.child.start_kill().is_ok();
        };

        #[cfg(windows)]
        {
            let result = std::process::Command::new("taskkill")
                .args(["/pid", &pid.to_string(), "/T", "/F"])
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status();
            match result {
                Ok(status) if status.success() => true,
                Ok(status) => {
                    tracing::warn!("taskkill for pid {} exited with {}", pid, status);
                    self.child.start_kill().is_ok()
                }
                Err(e) => {
                    tracing::warn!("taskkill for pid {} failed: {}", pid, e);
                    self.child.start_kill().is_ok()
                }
            }
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("SIGTERM to pid {} failed: {}, sending SIGKILL", pid, e);
                    self.child.start_kill().is_ok()
                }
            }
        }

        #[cfg(not(any(unix, windows)))]
        {
            let _ = pid;
            self.child.start_kill().is_ok()
        }
    }

    /// Force-kill without waiting. Used when a hard deadline has passed.
    pub fn kill(&mut self) -> bool {
        if self.exit_status().is_some() {
            return true;
        }
        self.child.start_kill().is_ok()
    }
}

/// A tracked process and the lecture that owns it.
#[derive(Debug)]
pub struct ActiveProcessRecord {
    pub handle: ProcessHandle,
    pub kind: ProcessKind,
    pub lecture_id: String,
    pub started_at: DateTime<Utc>,
}

impl ActiveProcessRecord {
    pub fn new(handle: ProcessHandle, kind: ProcessKind, lecture_id: impl Into<String>) -> Self {
        Self {
            handle,
            kind,
            lecture_id: lecture_id.into(),
            started_at: Utc::now(),
        }
    }

    fn key(&self) -> ProcessKey {
        (self.lecture_id.clone(), self.kind)
    }
}

/// Point-in-time view of one registry entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProcessSnapshot {
    pub kind: ProcessKind,
    pub lecture_id: String,
    pub pid: Option<u32>,
    pub uptime_seconds: i64,
}

type ProcessKey = (String, ProcessKind);

/// Shared registry handle. Clones share the same entries.
///
/// The lock is never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    entries: Arc<Mutex<HashMap<ProcessKey, ActiveProcessRecord>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProcessKey, ActiveProcessRecord>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert `record`, replacing any previous entry for the same key.
    ///
    /// The replaced process is not stopped; callers stop it first.
    pub fn register(&self, record: ActiveProcessRecord) {
        let key = record.key();
        tracing::debug!(
            "Registered {} for {} (pid {:?})",
            record.kind,
            record.lecture_id,
            record.handle.pid()
        );
        if self.lock().insert(key, record).is_some() {
            tracing::debug!("Replaced an existing registry entry");
        }
    }

    pub fn remove(&self, lecture_id: &str, kind: ProcessKind) -> Option<ActiveProcessRecord> {
        self.lock().remove(&(lecture_id.to_string(), kind))
    }

    pub fn contains(&self, lecture_id: &str, kind: ProcessKind) -> bool {
        self.lock().contains_key(&(lecture_id.to_string(), kind))
    }

    pub fn pid(&self, lecture_id: &str, kind: ProcessKind) -> Option<u32> {
        self.lock()
            .get(&(lecture_id.to_string(), kind))
            .and_then(|record| record.handle.pid())
    }

    /// `None` when nothing is tracked, `Some(None)` while the process runs.
    pub fn exit_status(&self, lecture_id: &str, kind: ProcessKind) -> Option<Option<ExitStatus>> {
        self.lock()
            .get_mut(&(lecture_id.to_string(), kind))
            .map(|record| record.handle.exit_status())
    }

    pub fn is_running(&self, lecture_id: &str, kind: ProcessKind) -> bool {
        matches!(self.exit_status(lecture_id, kind), Some(None))
    }

    /// Terminate and drop the entry for `(lecture_id, kind)`.
    ///
    /// Returns `false` when nothing was tracked.
    pub fn stop(&self, lecture_id: &str, kind: ProcessKind) -> bool {
        let Some(mut record) = self.remove(lecture_id, kind) else {
            return false;
        };

        tracing::info!(
            "Stopping {} for {} (pid {:?})",
            kind,
            lecture_id,
            record.handle.pid()
        );
        if !record.handle.terminate() {
            tracing::warn!("Termination request for {} {} failed", lecture_id, kind);
        }
        true
    }

    /// Terminate every tracked process. Returns how many entries were stopped.
    pub fn stop_all(&self) -> usize {
        let records: Vec<ActiveProcessRecord> = self.lock().drain().map(|(_, r)| r).collect();
        let count = records.len();

        for mut record in records {
            tracing::info!(
                "Stopping {} for {} (pid {:?})",
                record.kind,
                record.lecture_id,
                record.handle.pid()
            );
            record.handle.terminate();
        }

        count
    }

    /// Wait until the tracked process exits, polling every `poll`.
    ///
    /// Returns `None` if the entry disappears first (stopped elsewhere).
    pub async fn wait_for_exit(
        &self,
        lecture_id: &str,
        kind: ProcessKind,
        poll: Duration,
    ) -> Option<ExitStatus> {
        loop {
            match self.exit_status(lecture_id, kind) {
                None => return None,
                Some(Some(status)) => return Some(status),
                Some(None) => tokio::time::sleep(poll).await,
            }
        }
    }

    pub fn list(&self) -> Vec<ProcessSnapshot> {
        let now = Utc::now();
        let mut snapshots: Vec<ProcessSnapshot> = self
            .lock()
            .values()
            .map(|record| ProcessSnapshot {
                kind: record.kind,
                lecture_id: record.lecture_id.clone(),
                pid: record.handle.pid(),
                uptime_seconds: (now - record.started_at).num_seconds().max(0),
            })
            .collect();
        snapshots.sort_by(|a, b| a.lecture_id.cmp(&b.lecture_id));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
