//! Keyword heuristics over free-text agent output.

use super::OutputHeuristics;
use crate::phase::PhaseId;

/// Phrases that introduce a summary-worthy line.
const SUMMARY_MARKERS: &[&str] = &[
    "key findings:",
    "key insights:",
    "summary:",
    "💡",
    "highlights:",
];

/// How many lines after a marker are searched for the summary line.
const SUMMARY_LOOKAHEAD: usize = 4;

/// Shortest line accepted as a summary.
const MIN_SUMMARY_CHARS: usize = 10;

const FLUCTUATION_MARKERS: &[&str] = &[
    "phase 6 investigation required",
    "investigation: yes",
    "requires investigation",
    "| yes |",
    "fluctuations detected",
];

/// Matched anywhere in the same text, these cancel a positive fluctuation marker.
const NEGATIVE_MARKERS: &[&str] = &["| no |", "investigation: no"];

/// Default heuristics: case-insensitive substring matching.
#[derive(Debug, Clone)]
pub struct KeywordHeuristics {
    summary_max_chars: usize,
}

impl Default for KeywordHeuristics {
    fn default() -> Self {
        Self::new(150)
    }
}

impl KeywordHeuristics {
    /// `summary_max_chars` is clamped so the ellipsis always fits.
    pub fn new(summary_max_chars: usize) -> Self {
        Self {
            summary_max_chars: summary_max_chars.max(MIN_SUMMARY_CHARS + 4),
        }
    }

    fn find_marked_line(&self, text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        let lines: Vec<&str> = text.lines().collect();

        for marker in SUMMARY_MARKERS {
            if !lower.contains(marker) {
                continue;
            }
            for (i, line) in lines.iter().enumerate() {
                if !line.to_lowercase().contains(marker) {
                    continue;
                }
                let window_end = (i + 1 + SUMMARY_LOOKAHEAD).min(lines.len());
                for candidate in &lines[(i + 1).min(window_end)..window_end] {
                    let cleaned = candidate
                        .trim()
                        .trim_start_matches(['-', '•', '*'])
                        .trim();
                    if cleaned.chars().count() > MIN_SUMMARY_CHARS {
                        return Some(self.truncate(cleaned));
                    }
                }
            }
        }
        None
    }

    fn truncate(&self, line: &str) -> String {
        if line.chars().count() <= self.summary_max_chars {
            return line.to_string();
        }
        let kept: String = line.chars().take(self.summary_max_chars - 3).collect();
        format!("{}...", kept)
    }
}

impl OutputHeuristics for KeywordHeuristics {
    fn classify_fluctuation(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        let Some(marker) = FLUCTUATION_MARKERS.iter().find(|m| lower.contains(*m)) else {
            return false;
        };
        if let Some(negative) = NEGATIVE_MARKERS.iter().find(|m| lower.contains(*m)) {
            tracing::debug!(
                positive = %marker,
                negative = %negative,
                "fluctuation marker cancelled by negative marker"
            );
            return false;
        }
        tracing::debug!(marker = %marker, "fluctuation marker found");
        true
    }

    fn summarize(&self, text: &str, phase: PhaseId) -> String {
        self.find_marked_line(text)
            .unwrap_or_else(|| phase.default_summary().to_string())
    }
}
