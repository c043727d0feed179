//! Run ledger: the single mutable record threaded through a playbook run.
//!
//! One `Ledger` is created per run and owned by the workflow engine for the
//! run's duration. Phase executors mutate it through the operations below,
//! each of which upholds one of the ledger invariants:
//! - a phase result slot is written at most once
//! - `phases_completed` never holds a duplicate
//! - `current_phase` never decreases and is never behind an attempted phase

use crate::errors::{LedgerError, WorkflowError};
use crate::phase::{DEFAULT_PLAYBOOK_ID, PhaseId, TOTAL_PHASES};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Immutable input parameters of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditParams {
    pub competitor_domains: Vec<String>,
    #[serde(default)]
    pub my_domain: Option<String>,
    #[serde(default = "default_market")]
    pub primary_market: String,
}

fn default_market() -> String {
    "us".to_string()
}

impl AuditParams {
    pub fn new(competitor_domains: Vec<String>) -> Self {
        Self {
            competitor_domains,
            my_domain: None,
            primary_market: default_market(),
        }
    }

    pub fn with_my_domain(mut self, domain: impl Into<String>) -> Self {
        self.my_domain = Some(domain.into());
        self
    }

    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.primary_market = market.into();
        self
    }

    /// Own domain first, then competitors.
    pub fn all_domains(&self) -> Vec<&str> {
        self.my_domain
            .iter()
            .chain(self.competitor_domains.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.competitor_domains.is_empty() {
            return Err(WorkflowError::InvalidParams(
                "at least one competitor domain is required".to_string(),
            ));
        }
        if let Some(blank) = self
            .competitor_domains
            .iter()
            .chain(self.my_domain.iter())
            .find(|d| d.trim().is_empty())
        {
            return Err(WorkflowError::InvalidParams(format!(
                "domain names must not be blank (got {:?})",
                blank
            )));
        }
        if self.primary_market.trim().is_empty() {
            return Err(WorkflowError::InvalidParams(
                "market code must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Origin of a message in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "ai")]
    Assistant,
    Tool,
    System,
}

impl Role {
    /// Only agent-produced entries are ever stored in the ledger.
    pub fn is_agent_output(self) -> bool {
        matches!(self, Role::Assistant | Role::Tool)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: Role,
    pub content: String,
}

impl AgentMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    InProgress,
    Completed,
    Cancelled,
}

impl TodoStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TodoStatus::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
}

/// Phase-specific fields of a phase record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseDetails {
    #[default]
    General,
    /// Phase 2: the routing flag consulted after phase 5.
    History {
        requires_investigation: bool,
        #[serde(default)]
        investigation_domains: Vec<String>,
    },
    /// Phase 4
    Gaps { has_my_domain: bool },
    /// Phase 6
    Investigation { executed: bool },
    /// Phase 7: artifact files produced by the report phase.
    Report {
        #[serde(default)]
        files: BTreeMap<String, String>,
    },
}

impl PhaseDetails {
    pub fn kind(&self) -> &'static str {
        match self {
            PhaseDetails::General => "general",
            PhaseDetails::History { .. } => "history",
            PhaseDetails::Gaps { .. } => "gaps",
            PhaseDetails::Investigation { .. } => "investigation",
            PhaseDetails::Report { .. } => "report",
        }
    }

    fn permitted_for(&self, phase: PhaseId) -> bool {
        match self {
            PhaseDetails::General => true,
            PhaseDetails::History { .. } => phase == PhaseId::HISTORY,
            PhaseDetails::Gaps { .. } => phase == PhaseId::GAPS,
            PhaseDetails::Investigation { .. } => phase == PhaseId::INVESTIGATION,
            PhaseDetails::Report { .. } => phase == PhaseId::REPORT,
        }
    }
}

/// The recorded outcome of one phase attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: PhaseId,
    pub success: bool,
    pub summary: String,
    /// Full raw output of the agent for this phase.
    pub detail: String,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    details: PhaseDetails,
}

impl PhaseRecord {
    /// Create a successful record, rejecting details that belong to another phase.
    pub fn success(
        phase: PhaseId,
        summary: impl Into<String>,
        detail: impl Into<String>,
        duration: Duration,
        details: PhaseDetails,
    ) -> Result<Self, LedgerError> {
        Self::validated(Self {
            phase,
            success: true,
            summary: summary.into(),
            detail: detail.into(),
            duration,
            error: None,
            details,
        })
    }

    /// Create a failed record. The error text doubles as the summary.
    pub fn failure(
        phase: PhaseId,
        error: impl Into<String>,
        duration: Duration,
        details: PhaseDetails,
    ) -> Result<Self, LedgerError> {
        let error = error.into();
        Self::validated(Self {
            phase,
            success: false,
            summary: error.clone(),
            detail: String::new(),
            duration,
            error: Some(error),
            details,
        })
    }

    fn validated(record: Self) -> Result<Self, LedgerError> {
        if record.details.permitted_for(record.phase) {
            Ok(record)
        } else {
            Err(LedgerError::DetailsMismatch {
                phase: record.phase,
                kind: record.details.kind(),
            })
        }
    }

    pub fn details(&self) -> &PhaseDetails {
        &self.details
    }

    /// Phase 2 routing flag; `false` for every other record.
    pub fn requires_investigation(&self) -> bool {
        matches!(
            self.details,
            PhaseDetails::History {
                requires_investigation: true,
                ..
            }
        )
    }

    /// Duration as shown in status events, e.g. `2.3s`.
    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration)
    }
}

/// Format a duration with one decimal of seconds.
pub fn format_duration(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

/// Final bookkeeping written by the report phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total_phases: u8,
    pub phases_executed: usize,
    pub phases_succeeded: usize,
    pub phases_failed: usize,
    pub investigation_executed: bool,
    pub errors: Vec<String>,
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
}

/// Truncated raw output of one earlier phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSection {
    pub phase: PhaseId,
    pub text: String,
    pub truncated: bool,
}

/// Bounded view of the phases before the one being rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorContext {
    pub sections: Vec<ContextSection>,
    /// Domains phase 2 flagged for investigation.
    pub flagged_domains: Vec<String>,
}

impl PriorContext {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section(&self, phase: PhaseId) -> Option<&ContextSection> {
        self.sections.iter().find(|s| s.phase == phase)
    }
}

/// The run ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    playbook_id: String,
    params: AuditParams,
    current_phase: PhaseId,
    phases_completed: Vec<PhaseId>,
    errors: Vec<String>,
    results: [Option<PhaseRecord>; TOTAL_PHASES as usize],
    messages: Vec<AgentMessage>,
    todos: Vec<Todo>,
    files: BTreeMap<String, String>,
    execution_summary: Option<ExecutionSummary>,
}

impl Ledger {
    pub fn new(params: AuditParams) -> Self {
        Self::with_playbook(DEFAULT_PLAYBOOK_ID, params)
    }

    pub fn with_playbook(playbook_id: impl Into<String>, params: AuditParams) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            playbook_id: playbook_id.into(),
            params,
            current_phase: PhaseId::OVERVIEW,
            phases_completed: Vec::new(),
            errors: Vec::new(),
            results: Default::default(),
            messages: Vec::new(),
            todos: Vec::new(),
            files: BTreeMap::new(),
            execution_summary: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn playbook_id(&self) -> &str {
        &self.playbook_id
    }

    pub fn params(&self) -> &AuditParams {
        &self.params
    }

    pub fn current_phase(&self) -> PhaseId {
        self.current_phase
    }

    pub fn phases_completed(&self) -> &[PhaseId] {
        &self.phases_completed
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn messages(&self) -> &[AgentMessage] {
        &self.messages
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn todo(&self, id: &str) -> Option<&Todo> {
        self.todos.iter().find(|t| t.id == id)
    }

    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn execution_summary(&self) -> Option<&ExecutionSummary> {
        self.execution_summary.as_ref()
    }

    // =========================================================================
    // Phase results
    // =========================================================================

    pub fn phase_result(&self, phase: PhaseId) -> Option<&PhaseRecord> {
        self.results[phase.index()].as_ref()
    }

    /// Write a phase result. Each slot accepts exactly one write.
    pub fn set_phase_result(&mut self, record: PhaseRecord) -> Result<(), LedgerError> {
        let slot = &mut self.results[record.phase.index()];
        if slot.is_some() {
            return Err(LedgerError::ResultAlreadySet {
                phase: record.phase,
            });
        }
        *slot = Some(record);
        Ok(())
    }

    /// Recorded results in phase order.
    pub fn phase_results(&self) -> impl Iterator<Item = &PhaseRecord> {
        self.results.iter().flatten()
    }

    /// Phase 2's routing flag, `false` when phase 2 is missing or failed.
    pub fn routing_flag(&self) -> bool {
        self.phase_result(PhaseId::HISTORY)
            .is_some_and(|r| r.success && r.requires_investigation())
    }

    // =========================================================================
    // Execution control
    // =========================================================================

    /// Move `current_phase` forward.
    ///
    /// A target at or behind the current phase is a no-op. Otherwise the
    /// target must be the linear successor, or phase 7 when leaving the
    /// benchmark phase through the branch that skips the investigation.
    pub fn advance_phase(&mut self, to: PhaseId) -> Result<(), LedgerError> {
        let from = self.current_phase;
        if to <= from {
            return Ok(());
        }
        let linear = from.next() == Some(to);
        let skip_branch = from == PhaseId::BENCHMARK && to == PhaseId::REPORT;
        if !linear && !skip_branch {
            return Err(LedgerError::InvalidTransition { from, to });
        }
        self.current_phase = to;
        Ok(())
    }

    /// Append a phase to `phases_completed`.
    ///
    /// The phase must not have been attempted before and must not lie ahead of
    /// `current_phase`.
    pub fn record_attempt(&mut self, phase: PhaseId) -> Result<(), LedgerError> {
        if self.phases_completed.contains(&phase) {
            return Err(LedgerError::DuplicateAttempt { phase });
        }
        if phase > self.current_phase {
            return Err(LedgerError::InvalidTransition {
                from: self.current_phase,
                to: phase,
            });
        }
        self.phases_completed.push(phase);
        Ok(())
    }

    pub fn append_error(&mut self, description: impl Into<String>) {
        self.errors.push(description.into());
    }

    // =========================================================================
    // Messages, todos, files
    // =========================================================================

    /// Append agent-produced messages, dropping prompt and system entries.
    ///
    /// Returns the number of messages stored.
    pub fn append_messages<I>(&mut self, messages: I) -> usize
    where
        I: IntoIterator<Item = AgentMessage>,
    {
        let before = self.messages.len();
        self.messages
            .extend(messages.into_iter().filter(|m| m.role.is_agent_output()));
        self.messages.len() - before
    }

    /// Replace the todo with the same id, or append a new one.
    pub fn upsert_todo(&mut self, id: &str, content: &str, status: TodoStatus) {
        match self.todos.iter_mut().find(|t| t.id == id) {
            Some(existing) => {
                existing.content = content.to_string();
                existing.status = status;
            }
            None => self.todos.push(Todo {
                id: id.to_string(),
                content: content.to_string(),
                status,
            }),
        }
    }

    /// Union `files` into the artifact map; later writes win.
    pub fn merge_files(&mut self, files: &BTreeMap<String, String>) {
        for (name, content) in files {
            self.files.insert(name.clone(), content.clone());
        }
    }

    // =========================================================================
    // Derived views
    // =========================================================================

    /// Truncated raw output of every phase before `phase` that produced any.
    ///
    /// Absent or failed phases are simply omitted.
    pub fn prior_context(&self, phase: PhaseId, max_chars: usize) -> PriorContext {
        let sections = self
            .phase_results()
            .filter(|r| r.phase < phase && !r.detail.trim().is_empty())
            .map(|r| {
                let truncated = r.detail.chars().count() > max_chars;
                let text = if truncated {
                    r.detail.chars().take(max_chars).collect()
                } else {
                    r.detail.clone()
                };
                ContextSection {
                    phase: r.phase,
                    text,
                    truncated,
                }
            })
            .collect();

        let flagged_domains = match self.phase_result(PhaseId::HISTORY).map(|r| r.details()) {
            Some(PhaseDetails::History {
                requires_investigation: true,
                investigation_domains,
            }) if phase > PhaseId::HISTORY => investigation_domains.clone(),
            _ => Vec::new(),
        };

        PriorContext {
            sections,
            flagged_domains,
        }
    }

    /// Build and store the execution summary from the ledger's current state.
    pub fn finalize(&mut self) -> &ExecutionSummary {
        let succeeded = self.phase_results().filter(|r| r.success).count();
        let failed = self.phase_results().filter(|r| !r.success).count();
        let elapsed = (Utc::now() - self.started_at).to_std().unwrap_or_default();
        self.execution_summary.insert(ExecutionSummary {
            total_phases: TOTAL_PHASES,
            phases_executed: self.phases_completed.len(),
            phases_succeeded: succeeded,
            phases_failed: failed,
            investigation_executed: self.phases_completed.contains(&PhaseId::INVESTIGATION),
            errors: self.errors.clone(),
            elapsed,
        })
    }
}

/// Serialize durations as milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
