//! Pre- and post-dispatch hooks for task tool calls
//!
//! The pre-dispatch hook enriches the outbound task prompt with context
//! retrieved from both memory backends and from the local summary cache.
//! The post-dispatch hook saves a summary of the finished task to both
//! backends and to the cache.
//!
//! Neither hook can fail: every backend or filesystem problem is written to
//! the error log and the hook carries on with whatever data it has.

use crate::{
    backend::CommandExecutor,
    config::{OrchestratorConfig, OrchestratorPaths},
    diagnostics::{ErrorLog, LastRunSnapshot, Operation},
    errors::Result,
    format::ContextFormatter,
    merge::merge_entries,
    parser::parse_entries,
    runner::CommandRunner,
    summary::{Retention, SummaryCache, summaries_to_entries},
    types::{
        CallPayload, CommandMode, FINGERPRINT_ARG, MemoryEntry, MemorySource, RUN_ID_ARG,
        RunContext, TaskSummaryRecord, ToolInvocation,
    },
};
use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Characters of the prompt kept in a summary record
pub const PROMPT_EXCERPT_CHARS: usize = 160;

/// Characters of the result message kept in a narrative
pub const NARRATIVE_MESSAGE_CHARS: usize = 180;

/// Why a hook did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The orchestrator is disabled
    Disabled,
    /// The intercepted tool is not the task tool
    NotTask,
    /// The prompt is missing or blank
    EmptyPrompt,
    /// The prompt already carries an injected context block
    AlreadyInjected,
}

/// Result of the pre-dispatch hook
#[derive(Debug, Clone, PartialEq)]
pub enum PreDispatchOutcome {
    /// The hook left the payload untouched
    Skipped(SkipReason),
    /// The pipeline ran
    Completed {
        /// Context to hand to the post-dispatch hook
        run: RunContext,
        /// Number of merged entries
        merged_count: usize,
        /// Whether a block was prepended to the prompt
        injected: bool,
    },
}

impl PreDispatchOutcome {
    /// Run context, when the pipeline ran
    pub fn run_context(&self) -> Option<&RunContext> {
        match self {
            Self::Completed { run, .. } => Some(run),
            Self::Skipped(_) => None,
        }
    }

    /// Whether the prompt was rewritten
    pub fn injected(&self) -> bool {
        matches!(self, Self::Completed { injected: true, .. })
    }
}

/// Result of the post-dispatch hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostDispatchOutcome {
    /// The hook did nothing
    Skipped(SkipReason),
    /// The summary was processed
    Completed {
        /// Dispatch the summary belongs to
        run_id: String,
        /// Fingerprint of the task prompt
        task_fingerprint: String,
        /// Backends that accepted the save
        saved: Vec<MemorySource>,
        /// Whether a new record was written to the summary cache
        cached: bool,
    },
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Fetching,
    Merging,
    Formatting,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetching => "fetching",
            Self::Merging => "merging",
            Self::Formatting => "formatting",
            Self::Done => "done",
        })
    }
}

/// Wires the pipeline stages into the two host lifecycle hooks
pub struct TaskContextOrchestrator {
    config: OrchestratorConfig,
    paths: OrchestratorPaths,
    runner: CommandRunner,
    summaries: SummaryCache,
    error_log: ErrorLog,
}

impl TaskContextOrchestrator {
    /// Creates an orchestrator for a project, loading
    /// `.opencode/task-context.json` (defaults when missing or malformed).
    pub fn new(directory: impl AsRef<Path>, executor: Arc<dyn CommandExecutor>) -> Self {
        let paths = OrchestratorPaths::for_project(directory);
        let config = OrchestratorConfig::load(&paths.config_file);
        Self::from_parts(paths, config, executor)
    }

    /// Creates an orchestrator for a project with an explicit configuration
    pub fn with_config(
        directory: impl AsRef<Path>,
        config: OrchestratorConfig,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self::from_parts(OrchestratorPaths::for_project(directory), config, executor)
    }

    fn from_parts(
        paths: OrchestratorPaths,
        config: OrchestratorConfig,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            runner: CommandRunner::from_config(executor, &config),
            summaries: SummaryCache::new(&paths.summaries),
            error_log: ErrorLog::new(&paths.error_log, config.log_level),
            config,
            paths,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// File locations in use
    pub fn paths(&self) -> &OrchestratorPaths {
        &self.paths
    }

    /// Summary cache backing this orchestrator
    pub fn summary_cache(&self) -> &SummaryCache {
        &self.summaries
    }

    fn retention(&self) -> Retention {
        Retention::new(
            self.config.max_summary_count,
            self.config.max_summary_age_hours,
        )
    }

    fn gate(&self, invocation: &ToolInvocation) -> Option<SkipReason> {
        if !self.config.enabled {
            Some(SkipReason::Disabled)
        } else if !invocation.is_task() {
            Some(SkipReason::NotTask)
        } else {
            None
        }
    }

    /// Pre-dispatch hook: injects retrieved context into `payload.args.prompt`.
    ///
    /// Also records the run id and task fingerprint in the argument bag so a
    /// host that cannot keep the returned `RunContext` can still correlate
    /// the post-dispatch call.
    pub async fn before(
        &self,
        invocation: &ToolInvocation,
        payload: &mut CallPayload,
    ) -> PreDispatchOutcome {
        if let Some(reason) = self.gate(invocation) {
            return PreDispatchOutcome::Skipped(reason);
        }

        let prompt = payload.prompt().to_string();
        if prompt.trim().is_empty() {
            return PreDispatchOutcome::Skipped(SkipReason::EmptyPrompt);
        }
        if ContextFormatter::is_injected(&prompt) {
            return PreDispatchOutcome::Skipped(SkipReason::AlreadyInjected);
        }

        let run = RunContext {
            run_id: new_run_id(),
            task_fingerprint: task_fingerprint(&prompt),
            original_prompt: prompt,
        };
        payload
            .args
            .insert(RUN_ID_ARG.to_string(), Value::String(run.run_id.clone()));
        payload.args.insert(
            FINGERPRINT_ARG.to_string(),
            Value::String(run.task_fingerprint.clone()),
        );

        self.trace(&run, Phase::Fetching);
        let prompt = run.original_prompt.as_str();
        let (serena_context, supermemory_context, serena_summaries, supermemory_summaries) = tokio::join!(
            self.runner
                .run(MemorySource::Serena, CommandMode::Context, prompt, None),
            self.runner
                .run(MemorySource::Supermemory, CommandMode::Context, prompt, None),
            self.runner
                .run(MemorySource::Serena, CommandMode::Summaries, prompt, None),
            self.runner
                .run(MemorySource::Supermemory, CommandMode::Summaries, prompt, None),
        );

        self.trace(&run, Phase::Merging);
        let mut primary = Vec::new();
        let mut secondary = Vec::new();
        for (source, mode, result) in [
            (MemorySource::Serena, CommandMode::Context, &serena_context),
            (MemorySource::Supermemory, CommandMode::Context, &supermemory_context),
            (MemorySource::Serena, CommandMode::Summaries, &serena_summaries),
            (MemorySource::Supermemory, CommandMode::Summaries, &supermemory_summaries),
        ] {
            let entries = self.collect_entries(&run.run_id, source, mode, result).await;
            if source.is_primary() {
                primary.extend(entries);
            } else {
                secondary.extend(entries);
            }
        }

        let cached = self.summaries.load(self.retention()).await;
        primary.extend(summaries_to_entries(&cached));

        let merged = merge_entries(&primary, &secondary, self.config.max_items);

        let outputs = BTreeMap::from([
            output_slot(MemorySource::Serena, CommandMode::Context, &serena_context),
            output_slot(MemorySource::Supermemory, CommandMode::Context, &supermemory_context),
            output_slot(MemorySource::Serena, CommandMode::Summaries, &serena_summaries),
            output_slot(MemorySource::Supermemory, CommandMode::Summaries, &supermemory_summaries),
        ]);
        let snapshot = LastRunSnapshot {
            run_id: &run.run_id,
            entries: &merged,
            merged_count: merged.len(),
            outputs,
        };
        if let Err(e) = snapshot.write(&self.paths.last_context).await {
            self.error_log
                .record(&run.run_id, None, Operation::Persist, &e)
                .await;
        }

        self.trace(&run, Phase::Formatting);
        let injected = match ContextFormatter::format(&merged, self.config.max_chars) {
            Some(block) => {
                payload.set_prompt(ContextFormatter::inject(&block, &run.original_prompt));
                true
            },
            None => false,
        };

        self.trace(&run, Phase::Done);
        info!(
            run_id = %run.run_id,
            merged = merged.len(),
            injected,
            "Task context prepared"
        );

        PreDispatchOutcome::Completed {
            merged_count: merged.len(),
            injected,
            run,
        }
    }

    /// Post-dispatch hook: saves a summary of the finished task.
    ///
    /// Uses `run` when the host kept the pre-dispatch context, otherwise the
    /// ids stored in the argument bag, otherwise fresh ids.
    pub async fn after(
        &self,
        invocation: &ToolInvocation,
        payload: &CallPayload,
        run: Option<&RunContext>,
    ) -> PostDispatchOutcome {
        if let Some(reason) = self.gate(invocation) {
            return PostDispatchOutcome::Skipped(reason);
        }

        let run = run.cloned().unwrap_or_else(|| recover_run_context(payload));
        let status = payload.result_status();
        let timestamp = Utc::now();

        let summary = json!({
            "run_id": run.run_id,
            "task_fingerprint": run.task_fingerprint,
            "status": status,
            "timestamp": timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        })
        .to_string();
        let narrative = narrative(&run.task_fingerprint, status, payload.result_message());

        let results = join_all(MemorySource::ALL.map(|source| {
            self.runner
                .run(source, CommandMode::Save, &summary, Some(narrative.as_str()))
        }))
        .await;

        let mut saved = Vec::new();
        for (source, result) in MemorySource::ALL.into_iter().zip(results) {
            match result {
                Ok(_) => saved.push(source),
                Err(e) => {
                    self.error_log
                        .record(&run.run_id, Some(source), Operation::Save, &e)
                        .await;
                },
            }
        }

        let record = TaskSummaryRecord {
            run_id: run.run_id.clone(),
            task_fingerprint: run.task_fingerprint.clone(),
            prompt_excerpt: run.original_prompt.chars().take(PROMPT_EXCERPT_CHARS).collect(),
            status: status.to_string(),
            narrative,
            timestamp,
        };
        let cached = match self.summaries.store(record, self.retention()).await {
            Ok(inserted) => inserted,
            Err(e) => {
                self.error_log
                    .record(&run.run_id, None, Operation::Persist, &e)
                    .await;
                false
            },
        };

        debug!(
            run_id = %run.run_id,
            saved = saved.len(),
            cached,
            "Task summary processed"
        );

        PostDispatchOutcome::Completed {
            run_id: run.run_id,
            task_fingerprint: run.task_fingerprint,
            saved,
            cached,
        }
    }

    async fn collect_entries(
        &self,
        run_id: &str,
        source: MemorySource,
        mode: CommandMode,
        result: &Result<String>,
    ) -> Vec<MemoryEntry> {
        let (fetch, parse) = match mode {
            CommandMode::Summaries => (Operation::FetchSummaries, Operation::ParseSummaries),
            _ => (Operation::Fetch, Operation::Parse),
        };

        match result {
            Ok(output) => match parse_entries(source, output) {
                Ok(entries) => entries,
                Err(e) => {
                    self.error_log.record(run_id, Some(source), parse, &e).await;
                    Vec::new()
                },
            },
            Err(e) => {
                self.error_log.record(run_id, Some(source), fetch, e).await;
                Vec::new()
            },
        }
    }

    fn trace(&self, run: &RunContext, phase: Phase) {
        debug!(run_id = %run.run_id, %phase, "Task context phase");
    }
}

fn output_slot<'a>(
    source: MemorySource,
    mode: CommandMode,
    result: &'a Result<String>,
) -> (String, Option<&'a str>) {
    (
        format!("{source}_{mode}"),
        result.as_ref().ok().map(String::as_str),
    )
}

fn recover_run_context(payload: &CallPayload) -> RunContext {
    let original_prompt = ContextFormatter::strip(payload.prompt()).to_string();
    RunContext {
        run_id: payload
            .string_arg(RUN_ID_ARG)
            .map_or_else(new_run_id, String::from),
        task_fingerprint: payload
            .string_arg(FINGERPRINT_ARG)
            .map_or_else(|| task_fingerprint(&original_prompt), String::from),
        original_prompt,
    }
}

/// Generates a run id from the current time and a random component
pub fn new_run_id() -> String {
    format!(
        "{}-{:016x}",
        Utc::now().timestamp_millis(),
        rand::random::<u64>()
    )
}

/// Stable fingerprint of a prompt: the first 8 bytes of its SHA-256, hex
pub fn task_fingerprint(prompt: &str) -> String {
    Sha256::digest(prompt.as_bytes())[..8]
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// One-line summary of a finished task
pub fn narrative(task_fingerprint: &str, status: &str, message: &str) -> String {
    let mut line = format!("Task {task_fingerprint} finished with status {status}");
    if !message.is_empty() {
        line.push_str(": ");
        line.extend(message.chars().take(NARRATIVE_MESSAGE_CHARS));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_fingerprint_is_stable() {
        let a = task_fingerprint("Implement task");
        assert_eq!(a, task_fingerprint("Implement task"));
        assert_ne!(a, task_fingerprint("Implement task!"));
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_run_ids_are_unique() {
        let a = new_run_id();
        let b = new_run_id();
        assert_ne!(a, b);
        assert!(a.split_once('-').is_some());
    }

    #[test]
    fn test_narrative() {
        assert_eq!(
            narrative("abc", "ok", ""),
            "Task abc finished with status ok"
        );
        let long = narrative("abc", "ok", &"m".repeat(500));
        assert_eq!(
            long,
            format!("Task abc finished with status ok: {}", "m".repeat(180))
        );
    }

    #[test]
    fn test_recover_run_context_from_args() {
        let mut payload = CallPayload::with_prompt("Task Context Pack\n- [serena] a: b\n\nOriginal");
        payload
            .args
            .insert(RUN_ID_ARG.to_string(), json!("run-42"));
        payload
            .args
            .insert(FINGERPRINT_ARG.to_string(), json!("fp-42"));

        let run = recover_run_context(&payload);
        assert_eq!(run.run_id, "run-42");
        assert_eq!(run.task_fingerprint, "fp-42");
        assert_eq!(run.original_prompt, "Original");
    }

    #[test]
    fn test_recover_run_context_recomputes() {
        let payload = CallPayload::with_prompt("Task prompt");
        let run = recover_run_context(&payload);
        assert_eq!(run.task_fingerprint, task_fingerprint("Task prompt"));
        assert_eq!(run.original_prompt, "Task prompt");
        assert!(!run.run_id.is_empty());
    }
}
