//! In-memory mock executor for tests and dry runs
use super::{BackendInvocation, CommandExecutor, CommandOutput};
use crate::{
    errors::{Result, TaskContextError},
    types::{CommandMode, MemorySource},
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Scripted reply for one backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    /// Text written to stdout
    pub stdout: String,
    /// Exit code of the simulated process
    pub exit_code: i32,
    /// Time taken before the reply is produced
    pub delay: Option<Duration>,
    /// When set, the call fails to execute with this message
    pub spawn_error: Option<String>,
}

impl MockResponse {
    /// Successful reply
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: 0,
            delay: None,
            spawn_error: None,
        }
    }

    /// Reply from a process exiting with `exit_code`
    pub fn exit(exit_code: i32, stdout: impl Into<String>) -> Self {
        Self {
            exit_code,
            ..Self::ok(stdout)
        }
    }

    /// Call that cannot be executed at all
    pub fn spawn_error(message: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(message.into()),
            ..Self::ok("")
        }
    }

    /// Delays the reply
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Default)]
struct MockState {
    // Queued replies per call; the last one is sticky
    responses: HashMap<(MemorySource, CommandMode), VecDeque<MockResponse>>,
    calls: Vec<BackendInvocation>,
}

/// An in-memory executor implementing `CommandExecutor`.
///
/// Unscripted calls succeed with `{}`. Clones share their script and call
/// log, so a test keeps one clone to inspect after handing another to the
/// orchestrator.
#[derive(Clone, Default)]
pub struct MockExecutor {
    state: Arc<Mutex<MockState>>,
}

impl MockExecutor {
    /// Creates an executor with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply for `(source, mode)`.
    ///
    /// Replies are consumed in order; the last queued reply answers every
    /// further call.
    pub fn respond(&self, source: MemorySource, mode: CommandMode, response: MockResponse) -> &Self {
        self.lock()
            .responses
            .entry((source, mode))
            .or_default()
            .push_back(response);
        self
    }

    /// Every invocation received so far, in call order
    pub fn calls(&self) -> Vec<BackendInvocation> {
        self.lock().calls.clone()
    }

    /// Invocations received for `(source, mode)`
    pub fn calls_for(&self, source: MemorySource, mode: CommandMode) -> Vec<BackendInvocation> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.source == source && call.mode == mode)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_response(&self, invocation: &BackendInvocation) -> MockResponse {
        let mut state = self.lock();
        state.calls.push(invocation.clone());
        match state.responses.get_mut(&(invocation.source, invocation.mode)) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| MockResponse::ok("{}")),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| MockResponse::ok("{}")),
            None => MockResponse::ok("{}"),
        }
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn execute(&self, invocation: &BackendInvocation) -> Result<CommandOutput> {
        let response = self.next_response(invocation);

        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = response.spawn_error {
            return Err(TaskContextError::execution(
                invocation.source,
                invocation.mode,
                message,
            ));
        }

        Ok(CommandOutput::exited(response.exit_code, response.stdout))
    }
}
