//! Phase catalogue for the audit playbook.
//!
//! This module provides:
//! - `PhaseId`, a validated phase number in `1..=7`
//! - Display names, todo ids and canned summaries for each phase
//! - The built-in phase briefs used when no template directory is configured

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the default playbook.
pub const DEFAULT_PLAYBOOK_ID: &str = "competitor-growth-engine-audit";

/// Total number of phases in the playbook.
pub const TOTAL_PHASES: u8 = 7;

/// A phase number in the range `1..=7`.
///
/// Serialized as a bare integer so ledger and event payloads keep the
/// `"phase": 3` shape consumers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PhaseId(u8);

impl PhaseId {
    pub const OVERVIEW: PhaseId = PhaseId(1);
    pub const HISTORY: PhaseId = PhaseId(2);
    pub const CONTENT: PhaseId = PhaseId(3);
    pub const GAPS: PhaseId = PhaseId(4);
    pub const BENCHMARK: PhaseId = PhaseId(5);
    pub const INVESTIGATION: PhaseId = PhaseId(6);
    pub const REPORT: PhaseId = PhaseId(7);

    /// All phases in execution order.
    pub const ALL: [PhaseId; 7] = [
        Self::OVERVIEW,
        Self::HISTORY,
        Self::CONTENT,
        Self::GAPS,
        Self::BENCHMARK,
        Self::INVESTIGATION,
        Self::REPORT,
    ];

    /// Create a phase id, returning `None` outside `1..=7`.
    pub fn new(number: u8) -> Option<Self> {
        (1..=TOTAL_PHASES).contains(&number).then_some(Self(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// Zero-based slot index into per-phase arrays.
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    /// The linear successor; phase 7 has none.
    pub fn next(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }

    /// Stable todo id, e.g. `phase_3`.
    pub fn todo_id(self) -> String {
        format!("phase_{}", self.0)
    }

    pub fn display_name(self) -> &'static str {
        match self.0 {
            1 => "Batch Overview",
            2 => "Historical Trends",
            3 => "Content & Technical SEO",
            4 => "Keyword Gap Analysis",
            5 => "Competitive Benchmark",
            6 => "Root Cause Investigation",
            _ => "Report Generation",
        }
    }

    /// Summary used when the agent output carries no recognisable marker.
    pub fn default_summary(self) -> &'static str {
        match self.0 {
            1 => "SEO overview data retrieved, traffic and keyword comparison complete",
            2 => "12-month historical trends analyzed, fluctuation detection complete",
            3 => "Content structure, technical SEO and UX analysis complete",
            4 => "Keyword gap analysis complete, competitive opportunities identified",
            5 => "Competitive benchmark complete, industry comparison done",
            6 => "Traffic fluctuation root cause investigation complete",
            _ => "Full audit report generated, HTML and DOCX versions ready",
        }
    }

    /// Built-in instructions for the phase body.
    ///
    /// Placeholders `{{competitor_domains}}`, `{{my_domain}}` and
    /// `{{primary_market}}` are substituted by the prompt renderer.
    pub fn brief(self) -> &'static str {
        match self.0 {
            1 => BRIEF_OVERVIEW,
            2 => BRIEF_HISTORY,
            3 => BRIEF_CONTENT,
            4 => BRIEF_GAPS,
            5 => BRIEF_BENCHMARK,
            6 => BRIEF_INVESTIGATION,
            _ => BRIEF_REPORT,
        }
    }

    /// Whether the phase only runs when phase 2 flags a fluctuation.
    pub fn is_optional(self) -> bool {
        self == Self::INVESTIGATION
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for PhaseId {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("phase must be between 1 and 7, got {}", value))
    }
}

impl From<PhaseId> for u8 {
    fn from(phase: PhaseId) -> Self {
        phase.0
    }
}

impl std::str::FromStr for PhaseId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches("phase_");
        let Ok(number) = trimmed.parse::<u8>() else {
            bail!("Invalid phase '{}'. Expected a number between 1 and 7", s);
        };
        match Self::new(number) {
            Some(phase) => Ok(phase),
            None => bail!("Invalid phase '{}'. Expected a number between 1 and 7", s),
        }
    }
}

const BRIEF_OVERVIEW: &str = r#"# Phase 1: Batch Overview

Collect a baseline for every domain below:

{{competitor_domains}}

Own domain: {{my_domain}}
Market database: {{primary_market}}

Steps:
1. Retrieve organic traffic, organic keyword count, paid traffic and authority score per domain.
2. Build a comparison table with one row per domain.
3. Rank the domains by organic traffic and note the largest gaps.

End with a "Key Findings:" section, one finding per line."#;

const BRIEF_HISTORY: &str = r#"# Phase 2: Historical Trends

Analyze 12 months of organic traffic history for:

{{competitor_domains}}

Own domain: {{my_domain}}
Market database: {{primary_market}}

Steps:
1. Retrieve the monthly organic traffic series for each domain.
2. Compute month-over-month change and flag any month with a change above 30%.
3. Produce a table with columns | Domain | Largest Change | Month | Fluctuation |.

Finish with exactly one line stating either
"Phase 6 Investigation Required: Yes" or "Investigation: No",
then a "Key Insights:" section."#;

const BRIEF_CONTENT: &str = r#"# Phase 3: Content & Technical SEO

For each competitor:

{{competitor_domains}}

Steps:
1. Review top landing pages, content formats and publishing cadence.
2. Check technical signals: page speed, indexability, structured data, internal linking.
3. Note user-experience patterns that support conversions.

End with a "Key Findings:" section."#;

const BRIEF_GAPS: &str = r#"# Phase 4: Keyword Gap Analysis

Compare keyword coverage between {{my_domain}} and:

{{competitor_domains}}

Market database: {{primary_market}}

Steps:
1. Identify keywords competitors rank for that the own domain misses (skip if no own domain).
2. Group opportunities by intent and estimated difficulty.
3. List the twenty highest-value opportunities.

End with a "Key Findings:" section."#;

const BRIEF_BENCHMARK: &str = r#"# Phase 5: Competitive Benchmark

Benchmark all domains against each other and against industry norms:

{{competitor_domains}}

Steps:
1. Compare traffic share, keyword breadth, backlink profile and content velocity.
2. Score each domain on a 1-10 scale per dimension.
3. Identify the leader in each dimension.

End with a "Summary:" section."#;

const BRIEF_INVESTIGATION: &str = r#"# Phase 6: Root Cause Investigation

Phase 2 detected significant traffic fluctuations. Investigate their causes for:

{{competitor_domains}}

Steps:
1. Correlate each fluctuation with algorithm updates, site migrations, content changes or lost backlinks.
2. Rate confidence for each explanation.
3. Recommend follow-up actions.

End with a "Key Findings:" section."#;

const BRIEF_REPORT: &str = r#"# Phase 7: Report Generation

Assemble the complete competitor growth audit for:

{{competitor_domains}}

Own domain: {{my_domain}}
Market database: {{primary_market}}

Steps:
1. Consolidate the findings of every previous phase into an executive summary.
2. Write the full report as Markdown, then produce HTML and DOCX versions.
3. Save every produced file with the Write tool.

End with a "Highlights:" section."#;
