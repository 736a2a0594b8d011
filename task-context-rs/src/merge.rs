//! Deterministic merge of primary and secondary entries

use crate::types::MemoryEntry;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Merges both sources into one deduplicated, ordered, bounded list.
///
/// - On a key collision across sources the primary entry always wins.
/// - Within one list a later entry replaces an earlier one with the same key.
/// - Order: score descending, then timestamp descending, then key ascending.
/// - At most `max_items` entries are kept.
pub fn merge_entries(
    primary: &[MemoryEntry],
    secondary: &[MemoryEntry],
    max_items: usize,
) -> Vec<MemoryEntry> {
    let mut by_key: HashMap<&str, &MemoryEntry> = HashMap::new();
    for entry in secondary.iter().chain(primary) {
        by_key.insert(entry.key.as_str(), entry);
    }

    let mut merged: Vec<MemoryEntry> = by_key.into_values().cloned().collect();
    merged.sort_by(compare_entries);
    merged.truncate(max_items);
    merged
}

/// Total order used for merged entries
pub fn compare_entries(a: &MemoryEntry, b: &MemoryEntry) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.timestamp.cmp(&a.timestamp))
        .then_with(|| a.key.cmp(&b.key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemorySource;

    fn entry(key: &str, content: &str, score: f64, timestamp: i64, source: MemorySource) -> MemoryEntry {
        MemoryEntry::new(key, content, score, timestamp, source).unwrap()
    }

    #[test]
    fn test_primary_wins_on_overlap() {
        let primary = vec![entry("overlap", "serena-decision", 0.7, 0, MemorySource::Serena)];
        let secondary = vec![entry("overlap", "supermemory-decision", 0.9, 99, MemorySource::Supermemory)];

        let merged = merge_entries(&primary, &secondary, 8);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].content, "serena-decision");
        assert_eq!(merged[0].source, MemorySource::Serena);
    }

    #[test]
    fn test_ordering_by_score_then_timestamp_then_key() {
        let primary = vec![
            entry("b", "second", 0.4, 0, MemorySource::Serena),
            entry("a", "first", 0.8, 0, MemorySource::Serena),
        ];
        let merged = merge_entries(&primary, &[], 8);
        let keys: Vec<_> = merged.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);

        let primary = vec![
            entry("old", "x", 1.0, 10, MemorySource::Serena),
            entry("new", "x", 1.0, 20, MemorySource::Serena),
            entry("zeta", "x", 0.5, 5, MemorySource::Serena),
        ];
        let secondary = vec![entry("alpha", "x", 0.5, 5, MemorySource::Supermemory)];
        let merged = merge_entries(&primary, &secondary, 8);
        let keys: Vec<_> = merged.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["new", "old", "alpha", "zeta"]);
    }

    #[test]
    fn test_duplicates_within_source_collapse() {
        let secondary = vec![
            entry("dup", "remove-me", 1.0, 0, MemorySource::Supermemory),
            entry("dup", "remove-me", 1.0, 0, MemorySource::Supermemory),
        ];
        let merged = merge_entries(&[], &secondary, 8);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_later_entry_wins_within_source() {
        let primary = vec![
            entry("k", "backend", 0.1, 0, MemorySource::Serena),
            entry("k", "cached", 2.0, 0, MemorySource::Serena),
        ];
        let merged = merge_entries(&primary, &[], 8);
        assert_eq!(merged[0].content, "cached");
    }

    #[test]
    fn test_max_items_keeps_top_entries() {
        let primary: Vec<_> = (0..10)
            .map(|i| entry(&format!("k{i}"), "x", f64::from(i), 0, MemorySource::Serena))
            .collect();
        let merged = merge_entries(&primary, &[], 3);
        let keys: Vec<_> = merged.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["k9", "k8", "k7"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let primary = vec![
            entry("b", "second", 0.4, 0, MemorySource::Serena),
            entry("a", "first", 0.8, 0, MemorySource::Serena),
            entry("c", "tie", 0.4, 0, MemorySource::Serena),
        ];
        let secondary = vec![
            entry("dup", "remove-me", 1.0, 0, MemorySource::Supermemory),
            entry("c", "loses", 5.0, 0, MemorySource::Supermemory),
        ];

        let first = merge_entries(&primary, &secondary, 8);
        let second = merge_entries(&primary, &secondary, 8);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_empty_inputs() {
        assert!(merge_entries(&[], &[], 8).is_empty());
    }
}
