//! Bounded, time-windowed cache of completed task summaries
//!
//! The cache is a pretty-printed JSON array of `TaskSummaryRecord`s. It is
//! pruned by age and count on every load and before every write, and new
//! records are only inserted when neither their run id nor their task
//! fingerprint is already present.

use crate::{
    errors::Result,
    types::{MemoryEntry, MemorySource, TaskSummaryRecord},
};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Score given to cached summaries so they outrank generic backend hits
pub const SUMMARY_SCORE: f64 = 2.0;

/// Age and count limits applied to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    /// Maximum number of records kept
    pub max_count: usize,
    /// Records older than this are dropped
    pub max_age_hours: u64,
}

impl Retention {
    /// Creates retention limits
    pub fn new(max_count: usize, max_age_hours: u64) -> Self {
        Self {
            max_count,
            max_age_hours,
        }
    }
}

/// File-backed summary store
#[derive(Debug, Clone)]
pub struct SummaryCache {
    path: PathBuf,
}

impl SummaryCache {
    /// Creates a cache stored at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every persisted record.
    ///
    /// A missing or unparseable file reads as empty; individual records that
    /// do not decode are skipped.
    pub async fn read(&self) -> Vec<TaskSummaryRecord> {
        let Ok(raw) = tokio::fs::read_to_string(&self.path).await else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<Value>>(&raw) {
            Ok(records) => records
                .into_iter()
                .filter_map(|record| serde_json::from_value(record).ok())
                .collect(),
            Err(e) => {
                debug!("Ignoring unreadable summary cache {}: {}", self.path.display(), e);
                Vec::new()
            },
        }
    }

    /// Loads the records that survive `retention`
    pub async fn load(&self, retention: Retention) -> Vec<TaskSummaryRecord> {
        trim(self.read().await, retention, Utc::now())
    }

    /// Overwrites the cache with `records`
    pub async fn write(&self, records: &[TaskSummaryRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let serialized = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&self.path, serialized).await?;
        Ok(())
    }

    /// Persists `record` unless a retained record with the same run id or
    /// fingerprint is already stored. Expired records never block an insert.
    ///
    /// Returns whether the record was inserted.
    pub async fn store(&self, record: TaskSummaryRecord, retention: Retention) -> Result<bool> {
        let existing = self.load(retention).await;
        if is_duplicate(&record, &existing) {
            debug!(
                "Summary for run {} / task {} already cached",
                record.run_id, record.task_fingerprint
            );
            return Ok(false);
        }

        let next = trim(append(record, existing), retention, Utc::now());
        self.write(&next).await?;
        Ok(true)
    }
}

/// Drops records older than the retention window, newest first, at most
/// `max_count`.
pub fn trim(
    mut records: Vec<TaskSummaryRecord>,
    retention: Retention,
    now: DateTime<Utc>,
) -> Vec<TaskSummaryRecord> {
    let cutoff = i64::try_from(retention.max_age_hours)
        .ok()
        .and_then(Duration::try_hours)
        .and_then(|max_age| now.checked_sub_signed(max_age));

    records.retain(|record| cutoff.is_none_or(|cutoff| record.timestamp >= cutoff));
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    records.truncate(retention.max_count);
    records
}

/// Whether `existing` already holds a summary for this run or task
pub fn is_duplicate(record: &TaskSummaryRecord, existing: &[TaskSummaryRecord]) -> bool {
    existing.iter().any(|item| {
        item.run_id == record.run_id || item.task_fingerprint == record.task_fingerprint
    })
}

/// Inserts `record` at the head of `existing` unless it is a duplicate.
pub fn append(record: TaskSummaryRecord, mut existing: Vec<TaskSummaryRecord>) -> Vec<TaskSummaryRecord> {
    if !is_duplicate(&record, &existing) {
        existing.insert(0, record);
    }
    existing
}

/// Projects cached summaries into primary-source context entries
pub fn summaries_to_entries(records: &[TaskSummaryRecord]) -> Vec<MemoryEntry> {
    records
        .iter()
        .filter_map(|record| {
            MemoryEntry::new(
                &format!("summary:{}", record.task_fingerprint),
                &record.narrative,
                SUMMARY_SCORE,
                record.timestamp.timestamp_millis(),
                MemorySource::Serena,
            )
        })
        .collect()
}
