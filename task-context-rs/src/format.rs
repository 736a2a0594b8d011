//! Rendering of merged entries into the injected context block

use crate::types::MemoryEntry;

/// First line of every injected block; also used to detect re-injection
pub const CONTEXT_HEADER: &str = "Task Context Pack";

/// Suffix appended to a block cut to the character budget
pub const TRUNCATION_MARKER: &str = "\n(truncated)";

/// Formats entries for injection into a prompt.
pub struct ContextFormatter;

impl ContextFormatter {
    /// Renders the block, or `None` when there is nothing to inject.
    ///
    /// Multi-line content is joined onto its entry line, so the block never
    /// contains a blank line. Budgets are counted in characters, not bytes.
    pub fn format(entries: &[MemoryEntry], max_chars: usize) -> Option<String> {
        if entries.is_empty() {
            return None;
        }

        let mut lines = vec![CONTEXT_HEADER.to_string()];
        lines.extend(
            entries
                .iter()
                .map(|entry| {
                    format!(
                        "- [{}] {}: {}",
                        entry.source,
                        entry.key,
                        single_line(&entry.content)
                    )
                }),
        );

        Some(Self::truncate(&lines.join("\n"), max_chars))
    }

    /// Cuts `text` to `max_chars` characters including the truncation marker.
    ///
    /// Text within budget is returned unchanged.
    pub fn truncate(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }

        let keep = max_chars.saturating_sub(TRUNCATION_MARKER.chars().count());
        let cut = text
            .char_indices()
            .nth(keep)
            .map_or(text.len(), |(index, _)| index);
        format!("{}{}", text[..cut].trim_end(), TRUNCATION_MARKER)
    }

    /// Whether a prompt already starts with an injected block
    pub fn is_injected(prompt: &str) -> bool {
        prompt.starts_with(CONTEXT_HEADER)
    }

    /// Prepends the block to a prompt, separated by a blank line
    pub fn inject(block: &str, prompt: &str) -> String {
        format!("{block}\n\n{prompt}")
    }

    /// Removes a previously injected block from a prompt.
    ///
    /// The block ends at the first blank line.
    pub fn strip(prompt: &str) -> &str {
        if !Self::is_injected(prompt) {
            return prompt;
        }
        prompt
            .split_once("\n\n")
            .map_or(prompt, |(_, original)| original)
    }
}

fn single_line(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
