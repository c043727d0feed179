//! Status event types emitted while a phase runs.

use crate::ledger::TodoStatus;
use crate::phase::PhaseId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a phase.
///
/// Legal order for one phase: `Started`, zero or more `Progress`, then exactly
/// one of `Completed` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Started,
    Progress,
    Completed,
    Error,
}

impl PhaseStatus {
    /// The todo status this phase status maps to.
    pub fn todo_status(self) -> TodoStatus {
        match self {
            PhaseStatus::Started | PhaseStatus::Progress => TodoStatus::InProgress,
            PhaseStatus::Completed => TodoStatus::Completed,
            PhaseStatus::Error => TodoStatus::Cancelled,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PhaseStatus::Completed | PhaseStatus::Error)
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Started => write!(f, "started"),
            PhaseStatus::Progress => write!(f, "progress"),
            PhaseStatus::Completed => write!(f, "completed"),
            PhaseStatus::Error => write!(f, "error"),
        }
    }
}

/// A structured phase transition.
///
/// Serializes as
/// `{"type":"phase_status","phase":2,"status":"completed","summary":...,"duration":...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "phase_status")]
pub struct StatusEvent {
    pub phase: PhaseId,
    pub status: PhaseStatus,
    pub summary: Option<String>,
    pub duration: Option<String>,
}

impl StatusEvent {
    pub fn new(phase: PhaseId, status: PhaseStatus) -> Self {
        Self {
            phase,
            status,
            summary: None,
            duration: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }
}
