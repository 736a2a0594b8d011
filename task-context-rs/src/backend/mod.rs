//! Backend execution layer
//!
//! This module defines the `CommandExecutor` trait, the capability the
//! orchestrator uses to reach the external memory backends, and its
//! implementations.

use crate::{
    errors::Result,
    types::{CommandMode, MemorySource},
};
use async_trait::async_trait;

pub mod mock;
pub mod process;

pub use process::ProcessExecutor;

/// A fully resolved backend command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInvocation {
    /// Backend being called
    pub source: MemorySource,
    /// Operation being requested
    pub mode: CommandMode,
    /// Program to execute
    pub program: String,
    /// Arguments, ending with `--json`
    pub args: Vec<String>,
}

impl BackendInvocation {
    /// Builds the command for a backend operation.
    ///
    /// `context` and `summaries` take the prompt; `save` takes the JSON
    /// summary followed by the narrative.
    pub fn new(
        program: impl Into<String>,
        source: MemorySource,
        mode: CommandMode,
        payload: &str,
        narrative: Option<&str>,
    ) -> Self {
        let mut args = vec![mode.as_str().to_string(), payload.to_string()];
        if mode == CommandMode::Save {
            args.push(narrative.unwrap_or_default().to_string());
        }
        args.push("--json".to_string());

        Self {
            source,
            mode,
            program: program.into(),
            args,
        }
    }

    /// Payload argument (prompt or JSON summary)
    pub fn payload(&self) -> &str {
        self.args.get(1).map(String::as_str).unwrap_or_default()
    }

    /// Narrative argument of a save call
    pub fn narrative(&self) -> Option<&str> {
        match self.mode {
            CommandMode::Save => self.args.get(2).map(String::as_str),
            _ => None,
        }
    }

    /// Human-readable command line
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished backend process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output, decoded lossily as UTF-8
    pub stdout: String,
    /// Standard error, decoded lossily as UTF-8
    pub stderr: String,
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// Output of a process that exited with `code`
    pub fn exited(code: i32, stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(code),
        }
    }

    /// Whether the process exited with status 0
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Diagnostic text of a failed run: stderr when present, stdout otherwise
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Capability to run a backend command to completion
///
/// Implementations must not apply their own deadline; the runner races every
/// call against its configured timeout and drops the future when it fires.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs the command and returns its captured output.
    ///
    /// A non-zero exit is reported through `CommandOutput::exit_code`, not as
    /// an error. Errors are reserved for commands that could not run at all.
    async fn execute(&self, invocation: &BackendInvocation) -> Result<CommandOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_invocation_shape() {
        let invocation = BackendInvocation::new(
            "serena-memory",
            MemorySource::Serena,
            CommandMode::Context,
            "Implement task",
            Some("ignored"),
        );
        assert_eq!(invocation.args, vec!["context", "Implement task", "--json"]);
        assert_eq!(invocation.payload(), "Implement task");
        assert_eq!(invocation.narrative(), None);
        assert_eq!(
            invocation.command_line(),
            "serena-memory context Implement task --json"
        );
    }

    #[test]
    fn test_save_invocation_shape() {
        let invocation = BackendInvocation::new(
            "supermemory-memory",
            MemorySource::Supermemory,
            CommandMode::Save,
            r#"{"run_id":"1"}"#,
            None,
        );
        assert_eq!(
            invocation.args,
            vec!["save", r#"{"run_id":"1"}"#, "", "--json"]
        );
        assert_eq!(invocation.narrative(), Some(""));
    }

    #[test]
    fn test_command_output_diagnostic() {
        let output = CommandOutput::exited(1, "stdout text");
        assert!(!output.is_success());
        assert_eq!(output.diagnostic(), "stdout text");

        let output = CommandOutput {
            stderr: "stderr text".into(),
            ..CommandOutput::exited(2, "stdout text")
        };
        assert_eq!(output.diagnostic(), "stderr text");
        assert!(CommandOutput::success("{}").is_success());
    }
}
