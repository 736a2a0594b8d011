//! Type definitions for the task-context orchestrator
//!
//! This module contains the data model shared by the pipeline stages: the
//! memory backends and their operations, retrieved entries, persisted run
//! summaries and the host-facing hook payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Name of the host tool whose dispatches are intercepted
pub const TASK_TOOL: &str = "task";

/// Argument-bag field carrying the run id between the two hooks
pub const RUN_ID_ARG: &str = "__taskContextRunId";

/// Argument-bag field carrying the task fingerprint between the two hooks
pub const FINGERPRINT_ARG: &str = "__taskContextFingerprint";

/// External memory backend that produced or receives data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    /// Primary backend, wins every key collision
    Serena,
    /// Secondary backend
    Supermemory,
}

impl MemorySource {
    /// Both backends, primary first
    pub const ALL: [MemorySource; 2] = [MemorySource::Serena, MemorySource::Supermemory];

    /// Short label used in context blocks and log records
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Serena => "serena",
            Self::Supermemory => "supermemory",
        }
    }

    /// Default program name of the backend CLI
    pub fn default_program(&self) -> &'static str {
        match self {
            Self::Serena => "serena-memory",
            Self::Supermemory => "supermemory-memory",
        }
    }

    /// Whether this is the primary source
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Serena)
    }
}

impl fmt::Display for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend sub-operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandMode {
    /// Fetch context entries relevant to a prompt
    Context,
    /// Fetch stored task summaries relevant to a prompt
    Summaries,
    /// Persist a task summary
    Save,
}

impl CommandMode {
    /// Subcommand passed to the backend CLI
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Summaries => "summaries",
            Self::Save => "save",
        }
    }
}

impl fmt::Display for CommandMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single retrievable fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Normalized unique identifier
    pub key: String,
    /// Display text
    pub content: String,
    /// Relevance, higher is more relevant
    pub score: f64,
    /// Epoch milliseconds, 0 when unknown
    pub timestamp: i64,
    /// Backend that produced the entry
    pub source: MemorySource,
}

impl MemoryEntry {
    /// Creates an entry, normalizing the key and trimming the content.
    ///
    /// Returns `None` when either the key or the content is empty after
    /// normalization.
    pub fn new(
        key: &str,
        content: &str,
        score: f64,
        timestamp: i64,
        source: MemorySource,
    ) -> Option<Self> {
        let key = normalize_key(key);
        let content = content.trim();
        if key.is_empty() || content.is_empty() {
            return None;
        }
        Some(Self {
            key,
            content: content.to_string(),
            score,
            timestamp,
            source,
        })
    }
}

/// Case-folds a key and collapses internal whitespace runs to one space.
pub fn normalize_key(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Persisted outcome of one completed task dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummaryRecord {
    /// Unique per dispatch attempt
    pub run_id: String,
    /// Stable hash of the prompt text
    pub task_fingerprint: String,
    /// Bounded prefix of the original prompt
    pub prompt_excerpt: String,
    /// Free-form completion status
    pub status: String,
    /// One-line human-readable summary
    pub narrative: String,
    /// Persistence instant
    pub timestamp: DateTime<Utc>,
}

/// Per-dispatch state handed from the pre-dispatch hook to the post-dispatch hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Unique id of this dispatch
    pub run_id: String,
    /// Fingerprint of the original prompt
    pub task_fingerprint: String,
    /// Prompt as it was before any context was injected
    pub original_prompt: String,
}

/// Descriptor of the intercepted host operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Name of the tool being executed
    pub tool: String,
    /// Host session id, if the host provides one
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "sessionID")]
    pub session_id: Option<String>,
}

impl ToolInvocation {
    /// Creates an invocation descriptor for a tool
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            session_id: None,
        }
    }

    /// Whether this is a task dispatch
    pub fn is_task(&self) -> bool {
        self.tool == TASK_TOOL
    }
}

/// Mutable call payload shared with the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallPayload {
    /// Tool arguments; `prompt` is rewritten by the pre-dispatch hook
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Tool result, available to the post-dispatch hook
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl CallPayload {
    /// Creates a payload carrying only a prompt argument
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        let mut args = Map::new();
        args.insert("prompt".to_string(), Value::String(prompt.into()));
        Self { args, result: None }
    }

    /// Attaches a tool result
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Prompt argument, empty when absent or not a string
    pub fn prompt(&self) -> &str {
        self.string_arg("prompt").unwrap_or_default()
    }

    /// Replaces the prompt argument
    pub fn set_prompt(&mut self, prompt: String) {
        self.args.insert("prompt".to_string(), Value::String(prompt));
    }

    /// String-valued argument
    pub fn string_arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }

    /// `result.status`, or `unknown`
    pub fn result_status(&self) -> &str {
        self.result_field("status").unwrap_or("unknown")
    }

    /// `result.message`, or empty
    pub fn result_message(&self) -> &str {
        self.result_field("message").unwrap_or_default()
    }

    fn result_field(&self, name: &str) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(|result| result.get(name))
            .and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  Mixed   Case\tKey \n"), "mixed case key");
        assert_eq!(normalize_key("   "), "");
    }

    #[test]
    fn test_memory_entry_rejects_empty_fields() {
        assert!(MemoryEntry::new(" ", "content", 0.0, 0, MemorySource::Serena).is_none());
        assert!(MemoryEntry::new("key", "  ", 0.0, 0, MemorySource::Serena).is_none());

        let entry = MemoryEntry::new(" K 1 ", " note ", 1.0, 5, MemorySource::Supermemory).unwrap();
        assert_eq!(entry.key, "k 1");
        assert_eq!(entry.content, "note");
    }

    #[test]
    fn test_source_serde_and_display() {
        assert_eq!(serde_json::to_value(MemorySource::Serena).unwrap(), json!("serena"));
        assert_eq!(MemorySource::Supermemory.to_string(), "supermemory");
        assert!(MemorySource::Serena.is_primary());
        assert!(!MemorySource::Supermemory.is_primary());
        assert_eq!(CommandMode::Summaries.to_string(), "summaries");
    }

    #[test]
    fn test_call_payload_accessors() {
        let payload = CallPayload::with_prompt("Do it")
            .with_result(json!({"status": "ok", "message": "done"}));
        assert_eq!(payload.prompt(), "Do it");
        assert_eq!(payload.result_status(), "ok");
        assert_eq!(payload.result_message(), "done");

        let payload: CallPayload = serde_json::from_value(json!({"args": {"prompt": 3}})).unwrap();
        assert_eq!(payload.prompt(), "");
        assert_eq!(payload.result_status(), "unknown");
        assert_eq!(payload.result_message(), "");
    }

    #[test]
    fn test_tool_invocation_is_task() {
        assert!(ToolInvocation::new("task").is_task());
        assert!(!ToolInvocation::new("bash").is_task());
    }
}
