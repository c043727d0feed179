//! Heuristics and status signals over agent output.
//!
//! This module provides:
//!
//! - `OutputHeuristics` - the narrow seam for fluctuation detection and
//!   summarization, with `KeywordHeuristics` as the marker-matching default
//! - `StatusEvent` / `PhaseStatus` - structured phase transitions
//! - `__PHASE_STATUS__{json}__` marker encoding and extraction
//!
//! Routing and summaries only ever go through `OutputHeuristics`, so the
//! keyword matching can be swapped for structured agent output without
//! touching the executor.

mod heuristics;
mod parser;
mod types;

pub use heuristics::KeywordHeuristics;
pub use parser::{
    STATUS_MARKER_PREFIX, STATUS_MARKER_SUFFIX, encode_status_marker, extract_status_events,
};
pub use types::{PhaseStatus, StatusEvent};

use crate::phase::PhaseId;

/// Interpretation of free-text phase output.
pub trait OutputHeuristics: Send + Sync {
    /// Whether the historical-trends output calls for the investigation phase.
    fn classify_fluctuation(&self, text: &str) -> bool;

    /// A one-line summary of a phase's output.
    fn summarize(&self, text: &str, phase: PhaseId) -> String;

    /// Which of `domains` the output singles out for investigation.
    ///
    /// Defaults to every domain mentioned in the text as a whole host name.
    fn flagged_domains(&self, text: &str, domains: &[&str]) -> Vec<String> {
        let lower = text.to_lowercase();
        domains
            .iter()
            .filter(|d| mentions_domain(&lower, &d.to_lowercase()))
            .map(|d| d.to_string())
            .collect()
    }
}

/// Whether `domain` occurs in `text` as a complete host name.
///
/// `a.com` does not match inside `alpha.com` or `a.com.au`, but does match
/// `www.a.com` and a sentence ending in `a.com.`
fn mentions_domain(text: &str, domain: &str) -> bool {
    if domain.is_empty() {
        return false;
    }
    let is_name_char = |c: char| c.is_alphanumeric() || c == '-' || c == '_';
    text.match_indices(domain).any(|(at, _)| {
        let clean_before = !text[..at].chars().next_back().is_some_and(is_name_char);
        let mut after = text[at + domain.len()..].chars();
        let clean_after = match after.next() {
            None => true,
            Some('.') => !after.next().is_some_and(is_name_char),
            Some(c) => !is_name_char(c),
        };
        clean_before && clean_after
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flagged_domains_matches_case_insensitively() {
        let h = KeywordHeuristics::default();
        let found = h.flagged_domains(
            "Traffic at Beta.com fell 40%; requires investigation",
            &["alpha.com", "beta.com"],
        );
        assert_eq!(found, vec!["beta.com".to_string()]);
    }

    #[test]
    fn test_flagged_domains_ignores_longer_host_names() {
        let h = KeywordHeuristics::default();
        let found = h.flagged_domains(
            "alpha.com and shop.a.com.au both dropped; requires investigation",
            &["a.com", "alpha.com"],
        );
        assert_eq!(found, vec!["alpha.com".to_string()]);
    }

    #[test]
    fn test_flagged_domains_accepts_subdomains_and_punctuation() {
        let h = KeywordHeuristics::default();
        let found = h.flagged_domains(
            "Investigate www.a.com. Also (b-c.io), not xb-c.io",
            &["a.com", "b-c.io"],
        );
        assert_eq!(found, vec!["a.com".to_string(), "b-c.io".to_string()]);
    }
}
