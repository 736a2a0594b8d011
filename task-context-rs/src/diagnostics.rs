//! Operator-facing diagnostics: the structured error log and the last-run
//! snapshot.

use crate::{
    config::LogLevel,
    errors::Result,
    types::{MemoryEntry, MemorySource},
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Pipeline step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Context fetch
    Fetch,
    /// Context payload decoding
    Parse,
    /// Summaries fetch
    FetchSummaries,
    /// Summaries payload decoding
    ParseSummaries,
    /// Summary save call
    Save,
    /// Local cache write
    Persist,
}

/// One line of the error log
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord<'a> {
    /// RFC 3339 instant the failure was recorded
    pub timestamp: String,
    /// Dispatch the failure belongs to
    pub run_id: &'a str,
    /// Backend involved, or `local` for cache failures
    pub source: &'a str,
    /// Failed step
    pub operation: Operation,
    /// Error message
    pub error: String,
}

/// Append-only newline-delimited JSON error log
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
    level: LogLevel,
}

impl ErrorLog {
    /// Creates a log at `path`, gated by `level`
    pub fn new(path: impl Into<PathBuf>, level: LogLevel) -> Self {
        Self {
            path: path.into(),
            level,
        }
    }

    /// Location of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records a backend failure.
    ///
    /// Writing is best-effort: a failure to append is reported through
    /// `tracing` and otherwise ignored.
    pub async fn record(
        &self,
        run_id: &str,
        source: Option<MemorySource>,
        operation: Operation,
        error: &dyn std::fmt::Display,
    ) {
        let source = source.map_or("local", |source| source.as_str());
        warn!(run_id, source, ?operation, "{}", error);

        if self.level == LogLevel::Silent {
            return;
        }

        let record = ErrorRecord {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            run_id,
            source,
            operation,
            error: error.to_string(),
        };
        if let Err(e) = self.append(&record).await {
            warn!("Failed to append to {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, record: &ErrorRecord<'_>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Diagnostics of the latest pre-dispatch run
#[derive(Debug, Clone, Serialize)]
pub struct LastRunSnapshot<'a> {
    /// Dispatch the snapshot belongs to
    pub run_id: &'a str,
    /// Merged entries, in injection order
    pub entries: &'a [MemoryEntry],
    /// Number of merged entries
    pub merged_count: usize,
    /// Raw backend outputs keyed by `<source>_<mode>`; `null` for failures
    pub outputs: BTreeMap<String, Option<&'a str>>,
}

impl LastRunSnapshot<'_> {
    /// Overwrites the snapshot file at `path`
    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, serialized).await?;
        Ok(())
    }
}
