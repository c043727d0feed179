//! Audit trail of completed playbook runs.
//!
//! Every run is written to `.playbook/runs/<timestamp>_<run8>/`:
//! - `ledger.json` - the run configuration, a per-phase index and the full ledger
//! - `phase-<n>-output.md` - raw agent output of each phase that produced any
//! - `artifacts/<file>` - files the agent wrote, flattened to their file names

use crate::ledger::{Ledger, PhaseRecord};
use crate::phase::PhaseId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRun {
    pub run_id: Uuid,
    pub playbook_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub config: RunConfig,
    pub phases: Vec<PhaseAudit>,
    pub ledger: Ledger,
}

impl AuditRun {
    pub fn new(config: RunConfig, ledger: Ledger) -> Self {
        let phases = ledger.phase_results().map(PhaseAudit::from_record).collect();
        Self {
            run_id: ledger.run_id(),
            playbook_id: ledger.playbook_id().to_string(),
            started_at: ledger.started_at(),
            ended_at: Utc::now(),
            config,
            phases,
            ledger,
        }
    }

    pub fn phase(&self, phase: PhaseId) -> Option<&PhaseAudit> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

/// Settings a run was executed with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub agent_cmd: String,
    pub agent_args: Vec<String>,
    pub max_context_chars: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,
    pub project_dir: PathBuf,
}

/// Index entry for one recorded phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseAudit {
    pub phase: PhaseId,
    pub name: String,
    pub success: bool,
    pub summary: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub output_chars: usize,
}

impl PhaseAudit {
    pub fn from_record(record: &PhaseRecord) -> Self {
        Self {
            phase: record.phase,
            name: record.phase.display_name().to_string(),
            success: record.success,
            summary: record.summary.clone(),
            duration_ms: record.duration.as_millis() as u64,
            error: record.error.clone(),
            output_chars: record.detail.chars().count(),
        }
    }
}

pub mod logger;
pub use logger::AuditLogger;
