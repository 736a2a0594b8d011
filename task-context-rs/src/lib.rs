//! # Task context orchestration for Rust
//!
//! Hooks that enrich delegated task prompts with memory retrieved from two
//! external memory backends, and record the outcome of each task afterwards.
//!
//! ## Features
//!
//! - **Bounded backend calls**: every backend CLI call is timed out and retried
//! - **Deterministic merging**: primary-source precedence, stable ordering
//! - **Summary cache**: recent task outcomes are re-injected into later tasks
//! - **Never fails the host**: every error is logged and absorbed
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nexus_task_context::{CallPayload, ProcessExecutor, TaskContextOrchestrator, ToolInvocation};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let orchestrator = TaskContextOrchestrator::new(".", Arc::new(ProcessExecutor::new()));
//!     let invocation = ToolInvocation::new("task");
//!     let mut payload = CallPayload::with_prompt("Implement the parser");
//!
//!     let outcome = orchestrator.before(&invocation, &mut payload).await;
//!     // ... dispatch the task with `payload` ...
//!     orchestrator
//!         .after(&invocation, &payload, outcome.run_context())
//!         .await;
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backend;
pub mod config;
pub mod diagnostics;
mod errors;
pub mod format;
pub mod merge;
pub mod orchestrator;
pub mod parser;
pub mod runner;
pub mod summary;
mod types;

pub use backend::{
    BackendInvocation, CommandExecutor, CommandOutput, ProcessExecutor,
    mock::{MockExecutor, MockResponse},
};
pub use config::{LogLevel, OrchestratorConfig, OrchestratorPaths};
pub use errors::{Result, TaskContextError};
pub use format::ContextFormatter;
pub use merge::merge_entries;
pub use orchestrator::{
    PostDispatchOutcome, PreDispatchOutcome, SkipReason, TaskContextOrchestrator,
    task_fingerprint,
};
pub use parser::parse_entries;
pub use runner::CommandRunner;
pub use summary::{Retention, SummaryCache};
pub use types::{
    CallPayload, CommandMode, FINGERPRINT_ARG, MemoryEntry, MemorySource, RUN_ID_ARG,
    RunContext, TASK_TOOL, TaskSummaryRecord, ToolInvocation, normalize_key,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CallPayload, OrchestratorConfig, PreDispatchOutcome, ProcessExecutor, Result,
        TaskContextError, TaskContextOrchestrator, ToolInvocation,
    };
}
