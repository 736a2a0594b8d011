//! Timeout- and retry-bounded backend calls

use crate::{
    backend::{BackendInvocation, CommandExecutor},
    config::OrchestratorConfig,
    errors::{Result, TaskContextError},
    types::{CommandMode, MemorySource},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Runs backend operations under a per-attempt deadline and a retry budget.
///
/// The runner never logs; callers decide what to do with the returned error.
#[derive(Clone)]
pub struct CommandRunner {
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
    retries: u32,
    programs: [String; 2],
}

impl CommandRunner {
    /// Creates a runner using the default backend program names
    pub fn new(executor: Arc<dyn CommandExecutor>, timeout: Duration, retries: u32) -> Self {
        Self {
            executor,
            timeout,
            retries,
            programs: MemorySource::ALL.map(|source| source.default_program().to_string()),
        }
    }

    /// Creates a runner from the orchestrator configuration
    pub fn from_config(executor: Arc<dyn CommandExecutor>, config: &OrchestratorConfig) -> Self {
        Self {
            executor,
            timeout: config.timeout(),
            retries: config.retries,
            programs: MemorySource::ALL.map(|source| config.program(source).to_string()),
        }
    }

    /// Per-attempt deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Additional attempts after the first failure
    pub fn retries(&self) -> u32 {
        self.retries
    }

    fn program(&self, source: MemorySource) -> &str {
        match source {
            MemorySource::Serena => &self.programs[0],
            MemorySource::Supermemory => &self.programs[1],
        }
    }

    /// Runs `mode` against `source`.
    ///
    /// Makes up to `retries + 1` attempts, each raced against the timeout.
    /// A failure that retrying cannot fix, such as a missing program, ends
    /// the loop early. Returns the stdout of the first successful attempt or
    /// the error of the last failed one.
    pub async fn run(
        &self,
        source: MemorySource,
        mode: CommandMode,
        payload: &str,
        narrative: Option<&str>,
    ) -> Result<String> {
        let invocation = BackendInvocation::new(self.program(source), source, mode, payload, narrative);
        let mut retries = 0;

        loop {
            match self.attempt(&invocation).await {
                Ok(output) => return Ok(output),
                Err(e) if e.is_transient() && retries < self.retries => retries += 1,
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, invocation: &BackendInvocation) -> Result<String> {
        let output = timeout(self.timeout, self.executor.execute(invocation))
            .await
            .map_err(|_| {
                TaskContextError::timeout(
                    invocation.source,
                    invocation.mode,
                    u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                )
            })??;

        if output.is_success() {
            Ok(output.stdout)
        } else {
            Err(TaskContextError::non_zero_exit(
                invocation.source,
                invocation.mode,
                output.exit_code,
                output.diagnostic(),
            ))
        }
    }
}
