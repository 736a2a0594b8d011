//! Orchestrator configuration
//!
//! The configuration lives in `<project>/.opencode/task-context.json`. Every
//! key is optional; values of the wrong type fall back to the default and
//! numbers are clamped to their documented minimums. A missing or unreadable
//! file silently yields the defaults.

use crate::types::MemorySource;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Minimum per-call deadline in milliseconds
pub const MIN_TIMEOUT_MS: u64 = 200;
/// Minimum formatted block size in characters
pub const MIN_MAX_CHARS: usize = 120;

/// Gate for the structured error log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Nothing is written to the error log
    Silent,
    /// Every backend failure is written to the error log
    Warn,
}

/// Resolved, validated configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// Gate for all behaviour
    pub enabled: bool,
    /// Per-attempt deadline in milliseconds
    pub timeout_ms: u64,
    /// Additional attempts after the first failure
    pub retries: u32,
    /// Cap on merged entries
    pub max_items: usize,
    /// Cap on the formatted block, in characters
    pub max_chars: usize,
    /// Cap on cached summaries
    pub max_summary_count: usize,
    /// Retention window of cached summaries
    pub max_summary_age_hours: u64,
    /// Error-log gate
    pub log_level: LogLevel,
    /// Program name of the primary backend
    pub serena_command: String,
    /// Program name of the secondary backend
    pub supermemory_command: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 2500,
            retries: 1,
            max_items: 8,
            max_chars: 1500,
            max_summary_count: 50,
            max_summary_age_hours: 72,
            log_level: LogLevel::Warn,
            serena_command: MemorySource::Serena.default_program().to_string(),
            supermemory_command: MemorySource::Supermemory.default_program().to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Loads the configuration file, falling back to defaults when it is
    /// missing or malformed.
    pub fn load(path: &Path) -> Self {
        let Ok(raw) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Self::from_value(&value),
            Err(_) => Self::default(),
        }
    }

    /// Normalizes a decoded JSON object into a configuration.
    ///
    /// Non-object values yield the defaults.
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        let Some(object) = value.as_object() else {
            return defaults;
        };
        let field = |name: &str| object.get(name);

        Self {
            enabled: field("enabled").and_then(as_bool).unwrap_or(defaults.enabled),
            timeout_ms: field("timeoutMs")
                .and_then(as_u64)
                .unwrap_or(defaults.timeout_ms)
                .max(MIN_TIMEOUT_MS),
            retries: field("retries")
                .and_then(as_u64)
                .map_or(defaults.retries, |retries| {
                    u32::try_from(retries).unwrap_or(u32::MAX)
                }),
            max_items: field("maxItems")
                .and_then(as_usize)
                .unwrap_or(defaults.max_items)
                .max(1),
            max_chars: field("maxChars")
                .and_then(as_usize)
                .unwrap_or(defaults.max_chars)
                .max(MIN_MAX_CHARS),
            max_summary_count: field("maxSummaryCount")
                .and_then(as_usize)
                .unwrap_or(defaults.max_summary_count)
                .max(1),
            max_summary_age_hours: field("maxSummaryAgeHours")
                .and_then(as_u64)
                .unwrap_or(defaults.max_summary_age_hours)
                .max(1),
            log_level: match field("logLevel").and_then(Value::as_str) {
                Some("silent") => LogLevel::Silent,
                _ => LogLevel::Warn,
            },
            serena_command: field("serenaCommand")
                .and_then(as_program)
                .unwrap_or(defaults.serena_command),
            supermemory_command: field("supermemoryCommand")
                .and_then(as_program)
                .unwrap_or(defaults.supermemory_command),
        }
    }

    /// Enables or disables the orchestrator
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the per-attempt deadline (clamped to 200ms)
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms.max(MIN_TIMEOUT_MS);
        self
    }

    /// Sets the number of retries after the first failed attempt
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the merged-entry cap
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.max(1);
        self
    }

    /// Sets the formatted-block budget (clamped to 120 characters)
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars.max(MIN_MAX_CHARS);
        self
    }

    /// Sets the summary-cache retention limits
    pub fn with_summary_retention(mut self, max_count: usize, max_age_hours: u64) -> Self {
        self.max_summary_count = max_count.max(1);
        self.max_summary_age_hours = max_age_hours.max(1);
        self
    }

    /// Sets the error-log gate
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Per-attempt deadline as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Program name configured for a backend
    pub fn program(&self, source: MemorySource) -> &str {
        match source {
            MemorySource::Serena => &self.serena_command,
            MemorySource::Supermemory => &self.supermemory_command,
        }
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|n| n.is_finite()).map(|n| n.max(0.0) as u64)),
        Value::String(text) => text.trim().parse::<f64>().ok().and_then(|n| {
            if n.is_finite() {
                Some(n.max(0.0) as u64)
            } else {
                None
            }
        }),
        _ => None,
    }
}

fn as_usize(value: &Value) -> Option<usize> {
    as_u64(value).map(|n| usize::try_from(n).unwrap_or(usize::MAX))
}

fn as_program(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|program| !program.is_empty())
        .map(String::from)
}

/// File locations used by the orchestrator, all relative to the project root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorPaths {
    /// `.opencode/task-context.json`
    pub config_file: PathBuf,
    /// `.opencode/cache/task-context/errors.log`
    pub error_log: PathBuf,
    /// `.opencode/cache/task-context/last-context.json`
    pub last_context: PathBuf,
    /// `.opencode/cache/task-context/summaries.json`
    pub summaries: PathBuf,
}

impl OrchestratorPaths {
    /// Resolves all paths for a project directory
    pub fn for_project(directory: impl AsRef<Path>) -> Self {
        let opencode = directory.as_ref().join(".opencode");
        let cache = opencode.join("cache").join("task-context");
        Self {
            config_file: opencode.join("task-context.json"),
            error_log: cache.join("errors.log"),
            last_context: cache.join("last-context.json"),
            summaries: cache.join("summaries.json"),
        }
    }
}
