use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LecternError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation invoked out of sequence (e.g. install before initialize).
    #[error("{0}")]
    Precondition(String),

    /// Missing lecture directory or entry source file.
    #[error("{0}")]
    Filesystem(String),

    /// Unreadable or unparseable manifest. Recoverable: the manifest is recreated.
    #[error("Invalid manifest {path}: {message}")]
    Manifest { path: String, message: String },

    #[error("Failed to launch {command}: {source}")]
    ProcessLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Non-zero exit with whatever the process wrote to its error stream.
    #[error("{command} exited with code {}{}", display_code(.code), display_stderr(.stderr))]
    ProcessExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: String,
        elapsed: Duration,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl LecternError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    pub fn filesystem(message: impl Into<String>) -> Self {
        Self::Filesystem(message.into())
    }

    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }

    /// Exit code carried by the error, when the failure came from a process.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ProcessExit { code, .. } => *code,
            _ => None,
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn display_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

pub type Result<T> = std::result::Result<T, LecternError>;
