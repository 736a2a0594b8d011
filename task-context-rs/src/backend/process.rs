//! Child-process executor for the memory backend CLIs

use super::{BackendInvocation, CommandExecutor, CommandOutput};
use crate::errors::{Result, TaskContextError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Runs backend commands as child processes.
///
/// Children are spawned with `kill_on_drop`, so a call abandoned by the
/// runner's timeout takes its process down with it.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    working_dir: Option<PathBuf>,
}

impl ProcessExecutor {
    /// Creates an executor that inherits the current working directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every command from `dir`
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, invocation: &BackendInvocation) -> Result<CommandOutput> {
        let program = which::which(&invocation.program).map_err(|e| {
            debug!("Failed to resolve {}: {}", invocation.program, e);
            TaskContextError::ProgramNotFound {
                backend: invocation.source,
                mode: invocation.mode,
                program: invocation.program.clone(),
            }
        })?;

        let mut cmd = Command::new(&program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        debug!(
            "Running {} {} via {}",
            invocation.source,
            invocation.mode,
            program.display()
        );

        let output = cmd.output().await.map_err(|e| {
            TaskContextError::execution(invocation.source, invocation.mode, e.to_string())
        })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}
