//! Error types for the task-context orchestrator
//!
//! Every failure that originates in the memory subsystem is represented here.
//! None of them is ever surfaced to the task dispatch itself: the hooks turn
//! them into structured log lines and degrade to "no context" / "no summary".

use crate::types::{CommandMode, MemorySource};
use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum TaskContextError {
    /// A backend attempt did not finish before its deadline
    #[error("{backend} {mode} timed out after {timeout_ms}ms")]
    Timeout {
        /// Backend that was called
        backend: MemorySource,
        /// Operation that was requested
        mode: CommandMode,
        /// Deadline that elapsed
        timeout_ms: u64,
    },

    /// A backend process exited with a non-zero status
    #[error("{backend} {mode} exited with code {}{}", display_code(.code), display_diagnostic(.diagnostic))]
    NonZeroExit {
        /// Backend that was called
        backend: MemorySource,
        /// Operation that was requested
        mode: CommandMode,
        /// Exit code, `None` when the process was terminated by a signal
        code: Option<i32>,
        /// Output captured from the failed process
        diagnostic: String,
    },

    /// A backend process could not be started or awaited
    #[error("{backend} {mode} execution failed: {message}")]
    Execution {
        /// Backend that was called
        backend: MemorySource,
        /// Operation that was requested
        mode: CommandMode,
        /// Description of the failure
        message: String,
    },

    /// The backend program is not installed or not on `PATH`
    #[error("{backend} {mode}: program {program} not found")]
    ProgramNotFound {
        /// Backend that was called
        backend: MemorySource,
        /// Operation that was requested
        mode: CommandMode,
        /// Program that could not be resolved
        program: String,
    },

    /// Backend output was not valid JSON
    #[error("invalid {backend} payload: {error}")]
    InvalidPayload {
        /// Backend that produced the payload
        backend: MemorySource,
        /// Decoder error
        #[source]
        error: serde_json::Error,
    },

    /// Filesystem errors while touching the cache directory
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors while writing cache files
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, TaskContextError>;

const DIAGNOSTIC_LIMIT: usize = 200;

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |code| code.to_string())
}

fn display_diagnostic(diagnostic: &str) -> String {
    let trimmed = diagnostic.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let clipped: String = trimmed.chars().take(DIAGNOSTIC_LIMIT).collect();
    format!(": {clipped}")
}

impl TaskContextError {
    /// Create a new Timeout error
    pub fn timeout(backend: MemorySource, mode: CommandMode, timeout_ms: u64) -> Self {
        Self::Timeout {
            backend,
            mode,
            timeout_ms,
        }
    }

    /// Create a new NonZeroExit error
    pub fn non_zero_exit(
        backend: MemorySource,
        mode: CommandMode,
        code: Option<i32>,
        diagnostic: impl Into<String>,
    ) -> Self {
        Self::NonZeroExit {
            backend,
            mode,
            code,
            diagnostic: diagnostic.into(),
        }
    }

    /// Create a new Execution error
    pub fn execution(backend: MemorySource, mode: CommandMode, message: impl Into<String>) -> Self {
        Self::Execution {
            backend,
            mode,
            message: message.into(),
        }
    }

    /// Check if the error came from a backend call that a retry could fix
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::NonZeroExit { .. } | Self::Execution { .. }
        )
    }
}
