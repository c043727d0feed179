use super::builder::{Transition, Workflow, WorkflowBuilder};
use crate::errors::WorkflowError;
use crate::executor::PhaseExecutor;
use crate::ledger::{AuditParams, Ledger};
use crate::phase::{DEFAULT_PLAYBOOK_ID, PhaseId};
use tracing::{debug, info, warn};

impl Workflow {
    /// Run the workflow on a fresh ledger for `params`.
    pub async fn run(
        &self,
        executor: &PhaseExecutor,
        params: AuditParams,
    ) -> Result<Ledger, WorkflowError> {
        self.run_ledger(executor, Ledger::new(params)).await
    }

    /// Walk the graph from the entry point until the terminal phase has run.
    ///
    /// Phase failures are recorded in the ledger and do not stop the walk.
    /// Only a router choosing an undeclared target or a ledger invariant
    /// violation aborts the run.
    pub async fn run_ledger(
        &self,
        executor: &PhaseExecutor,
        mut ledger: Ledger,
    ) -> Result<Ledger, WorkflowError> {
        let mut node = self.entry();
        loop {
            let outcome = executor.run(node, &mut ledger).await?;
            debug!(
                phase = node.number(),
                success = outcome.success,
                current_phase = ledger.current_phase().number(),
                "phase finished"
            );

            let next = match self.transition(node) {
                Some(Transition::Direct(to)) => *to,
                Some(Transition::Conditional { router, targets }) => {
                    let to = router(&ledger);
                    if !targets.contains(&to) {
                        return Err(WorkflowError::UndeclaredRoute { from: node, to });
                    }
                    to
                }
                Some(Transition::End) | None => break,
            };
            ledger.advance_phase(next)?;
            node = next;
        }
        Ok(ledger)
    }
}

/// Entry point for audit runs.
///
/// Validates the parameters, assembles the workflow and drives it to
/// completion with the configured executor.
pub struct PlaybookRunner {
    executor: PhaseExecutor,
    wiring: WorkflowBuilder,
    playbook_id: String,
}

impl PlaybookRunner {
    pub fn new(executor: PhaseExecutor) -> Self {
        Self {
            executor,
            wiring: WorkflowBuilder::audit_playbook(),
            playbook_id: DEFAULT_PLAYBOOK_ID.to_string(),
        }
    }

    /// Replace the standard wiring. It is validated on every `execute`.
    pub fn with_wiring(mut self, wiring: WorkflowBuilder) -> Self {
        self.wiring = wiring;
        self
    }

    pub fn with_playbook_id(mut self, playbook_id: impl Into<String>) -> Self {
        self.playbook_id = playbook_id.into();
        self
    }

    pub fn playbook_id(&self) -> &str {
        &self.playbook_id
    }

    /// Run one complete audit.
    ///
    /// Invalid parameters and broken wiring are reported before any phase runs.
    pub async fn execute(&self, params: AuditParams) -> Result<Ledger, WorkflowError> {
        params.validate()?;
        let workflow = self.wiring.clone().build()?;

        let ledger = Ledger::with_playbook(&self.playbook_id, params);
        info!(
            run_id = %ledger.run_id(),
            playbook = %self.playbook_id,
            competitors = ledger.params().competitor_domains.len(),
            market = %ledger.params().primary_market,
            "starting playbook run"
        );

        let ledger = workflow.run_ledger(&self.executor, ledger).await?;

        let completed: Vec<u8> = ledger
            .phases_completed()
            .iter()
            .map(|p| p.number())
            .collect();
        for error in ledger.errors() {
            warn!(error = %error, "phase error recorded");
        }
        info!(
            run_id = %ledger.run_id(),
            phases = ?completed,
            investigation = ledger.phases_completed().contains(&PhaseId::INVESTIGATION),
            errors = ledger.errors().len(),
            "playbook run finished"
        );
        Ok(ledger)
    }
}
