//! End-to-end playbook runs against scripted research agents.

use anyhow::{Result, bail};
use async_trait::async_trait;
use playbook::agent::{AgentResponse, ResearchAgent};
use playbook::errors::WorkflowError;
use playbook::executor::PhaseExecutor;
use playbook::ledger::{AgentMessage, AuditParams, Ledger, PhaseDetails, TodoStatus};
use playbook::phase::PhaseId;
use playbook::signals::{PhaseStatus, StatusEvent, extract_status_events};
use playbook::status::StatusReporter;
use playbook::workflow::{PlaybookRunner, Transition, WorkflowBuilder};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Answers each phase from a script keyed by phase number.
struct PhaseScript {
    replies: BTreeMap<u8, String>,
    fail_on: Option<u8>,
    report_file: Option<(String, String)>,
    prompts: Mutex<Vec<(u8, String)>>,
}

impl PhaseScript {
    fn new() -> Self {
        Self {
            replies: BTreeMap::new(),
            fail_on: None,
            report_file: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn reply(mut self, phase: u8, text: &str) -> Self {
        self.replies.insert(phase, text.to_string());
        self
    }

    fn fail_on(mut self, phase: u8) -> Self {
        self.fail_on = Some(phase);
        self
    }

    fn with_report_file(mut self, name: &str, content: &str) -> Self {
        self.report_file = Some((name.to_string(), content.to_string()));
        self
    }

    fn invoked(&self) -> Vec<u8> {
        self.prompts.lock().unwrap().iter().map(|(n, _)| *n).collect()
    }

    fn prompt_for(&self, phase: u8) -> Option<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| *n == phase)
            .map(|(_, p)| p.clone())
    }
}

fn phase_of(prompt: &str) -> u8 {
    (1..=7)
        .find(|n| prompt.contains(&format!("EXECUTING PHASE {} OF 7", n)))
        .unwrap_or(0)
}

#[async_trait]
impl ResearchAgent for PhaseScript {
    async fn invoke(&self, prompt: &str) -> Result<AgentResponse> {
        let phase = phase_of(prompt);
        self.prompts
            .lock()
            .unwrap()
            .push((phase, prompt.to_string()));

        if self.fail_on == Some(phase) {
            bail!("keyword provider timed out");
        }
        let text = self.replies.get(&phase).cloned().unwrap_or_else(|| {
            format!("Key Findings:\nPhase {} found steady organic growth", phase)
        });
        let mut response = AgentResponse::from_messages(vec![
            AgentMessage::tool("WebSearch: organic traffic"),
            AgentMessage::assistant(text),
        ]);
        if phase == 7
            && let Some((name, content)) = &self.report_file
        {
            response.files.insert(name.clone(), content.clone());
        }
        Ok(response)
    }
}

fn params() -> AuditParams {
    AuditParams::new(vec!["alpha.com".to_string(), "beta.com".to_string()])
        .with_my_domain("mine.com")
        .with_market("us")
}

fn runner(agent: Arc<PhaseScript>) -> PlaybookRunner {
    PlaybookRunner::new(PhaseExecutor::new(agent))
}

const FLAGGED: &str = "Key Findings:\nalpha.com requires investigation after the March drop";
const NOT_FLAGGED: &str = "Key Findings:\nNo anomalies.\nInvestigation: no";

// =============================================================================
// Routing scenarios
// =============================================================================

#[tokio::test]
async fn test_fluctuation_path_runs_investigation() {
    let agent = Arc::new(PhaseScript::new().reply(2, FLAGGED));
    let ledger = runner(agent.clone()).execute(params()).await.unwrap();

    assert_eq!(
        ledger.phases_completed().to_vec(),
        PhaseId::ALL.to_vec(),
        "every phase should run"
    );
    let investigation = ledger.phase_result(PhaseId::INVESTIGATION).unwrap();
    assert!(investigation.success);
    assert_eq!(
        investigation.details(),
        &PhaseDetails::Investigation { executed: true }
    );
    assert_eq!(agent.invoked(), vec![1, 2, 3, 4, 5, 6, 7]);
    assert!(ledger.routing_flag());
}

#[tokio::test]
async fn test_negative_marker_skips_investigation() {
    let agent = Arc::new(PhaseScript::new().reply(2, NOT_FLAGGED));
    let ledger = runner(agent.clone()).execute(params()).await.unwrap();

    let expected = [1, 2, 3, 4, 5, 7].map(|n| PhaseId::new(n).unwrap());
    assert_eq!(ledger.phases_completed(), &expected);
    assert!(ledger.phase_result(PhaseId::INVESTIGATION).is_none());
    assert!(!agent.invoked().contains(&6));
    assert!(!ledger.errors().iter().any(|e| e.contains("Phase 6")));
}

#[tokio::test]
async fn test_positive_and_negative_markers_cancel() {
    let text = "requires investigation for alpha.com | no | for beta.com";
    let agent = Arc::new(PhaseScript::new().reply(2, text));
    let ledger = runner(agent).execute(params()).await.unwrap();

    assert!(!ledger.routing_flag());
    assert!(ledger.phase_result(PhaseId::INVESTIGATION).is_none());
}

// =============================================================================
// Failure resilience
// =============================================================================

#[tokio::test]
async fn test_phase_failure_is_contained() {
    let agent = Arc::new(PhaseScript::new().fail_on(3));
    let ledger = runner(agent.clone()).execute(params()).await.unwrap();

    let content = ledger.phase_result(PhaseId::CONTENT).unwrap();
    assert!(!content.success);
    assert_eq!(ledger.errors().len(), 1);
    assert!(ledger.errors()[0].contains("Phase 3"));
    assert!(ledger.phases_completed().contains(&PhaseId::CONTENT));

    let invoked = agent.invoked();
    let pos = invoked.iter().position(|n| *n == 3).unwrap();
    assert_eq!(invoked[pos + 1], 4, "phase 4 runs right after the failure");
    assert!(ledger.phase_result(PhaseId::GAPS).unwrap().success);
}

#[tokio::test]
async fn test_history_failure_routes_to_report() {
    let agent = Arc::new(PhaseScript::new().fail_on(2));
    let ledger = runner(agent.clone()).execute(params()).await.unwrap();

    assert!(!ledger.routing_flag());
    assert_eq!(agent.invoked(), vec![1, 2, 3, 4, 5, 7]);
    assert_eq!(
        ledger.phase_result(PhaseId::HISTORY).unwrap().details(),
        &PhaseDetails::History {
            requires_investigation: false,
            investigation_domains: Vec::new(),
        }
    );
}

#[tokio::test]
async fn test_missing_entry_point_fails_before_any_phase() {
    let agent = Arc::new(PhaseScript::new());
    let mut wiring = WorkflowBuilder::new();
    for phase in PhaseId::ALL {
        wiring = wiring.add_node(phase);
    }
    for pair in PhaseId::ALL.windows(2) {
        wiring = wiring.add_edge(pair[0], pair[1]);
    }
    let wiring = wiring.add_terminal_edge(PhaseId::REPORT);

    let result = runner(agent.clone())
        .with_wiring(wiring)
        .execute(params())
        .await;

    assert_eq!(result.unwrap_err(), WorkflowError::MissingEntryPoint);
    assert!(agent.invoked().is_empty());
}

#[tokio::test]
async fn test_wiring_that_skips_phases_fails_before_any_phase() {
    let agent = Arc::new(PhaseScript::new());
    let wiring = WorkflowBuilder::new()
        .add_node(PhaseId::OVERVIEW)
        .add_node(PhaseId::HISTORY)
        .add_node(PhaseId::REPORT)
        .set_entry_point(PhaseId::OVERVIEW)
        .add_edge(PhaseId::OVERVIEW, PhaseId::HISTORY)
        .add_edge(PhaseId::HISTORY, PhaseId::REPORT)
        .add_terminal_edge(PhaseId::REPORT);

    let result = runner(agent.clone())
        .with_wiring(wiring)
        .execute(params())
        .await;

    assert!(matches!(
        result,
        Err(WorkflowError::UnexpectedEdge {
            from: PhaseId::HISTORY,
            ..
        })
    ));
    assert!(agent.invoked().is_empty());
}

#[tokio::test]
async fn test_invalid_params_fail_before_any_phase() {
    let agent = Arc::new(PhaseScript::new());
    let result = runner(agent.clone())
        .execute(AuditParams::new(Vec::new()))
        .await;

    assert!(matches!(result, Err(WorkflowError::InvalidParams(_))));
    assert!(agent.invoked().is_empty());
}

// =============================================================================
// Run properties
// =============================================================================

#[tokio::test]
async fn test_sequence_is_strictly_increasing_without_duplicates() {
    for reply in [FLAGGED, NOT_FLAGGED] {
        let agent = Arc::new(PhaseScript::new().reply(2, reply));
        let ledger = runner(agent).execute(params()).await.unwrap();

        let numbers: Vec<u8> = ledger
            .phases_completed()
            .iter()
            .map(|p| p.number())
            .collect();
        assert!(numbers.windows(2).all(|w| w[0] < w[1]), "{:?}", numbers);
        assert_eq!(numbers.first(), Some(&1));
        assert_eq!(numbers.last(), Some(&7));
        assert_eq!(ledger.current_phase(), PhaseId::REPORT);
    }
}

#[tokio::test]
async fn test_current_phase_never_moves_backwards_during_run() {
    let workflow = WorkflowBuilder::audit_playbook().build().unwrap();

    for (reply, expected_path) in [
        (FLAGGED, vec![1u8, 2, 3, 4, 5, 6, 7]),
        (NOT_FLAGGED, vec![1u8, 2, 3, 4, 5, 7]),
    ] {
        let agent = Arc::new(PhaseScript::new().reply(2, reply));
        let executor = PhaseExecutor::new(agent.clone());
        let mut ledger = Ledger::new(params());
        let mut observed = vec![ledger.current_phase().number()];

        // Step through the graph one phase at a time, sampling the ledger
        // around every executor call and every routed advance.
        let mut node = workflow.entry();
        loop {
            observed.push(ledger.current_phase().number());
            executor.run(node, &mut ledger).await.unwrap();
            observed.push(ledger.current_phase().number());

            let next = match workflow.transition(node).unwrap() {
                Transition::Direct(to) => *to,
                Transition::Conditional { router, .. } => router(&ledger),
                Transition::End => break,
            };
            ledger.advance_phase(next).unwrap();
            observed.push(ledger.current_phase().number());
            node = next;
        }

        assert!(
            observed.windows(2).all(|w| w[0] <= w[1]),
            "current_phase went backwards: {:?}",
            observed
        );
        assert_eq!(observed.last(), Some(&7));
        assert_eq!(agent.invoked(), expected_path);
    }
}

#[tokio::test]
async fn test_one_terminal_todo_per_phase() {
    let agent = Arc::new(PhaseScript::new().reply(2, FLAGGED).fail_on(4));
    let ledger = runner(agent).execute(params()).await.unwrap();

    let ids: HashSet<&str> = ledger.todos().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids.len(), ledger.todos().len(), "todo ids must be unique");
    assert_eq!(ledger.todos().len(), 7);
    for todo in ledger.todos() {
        assert!(todo.status.is_terminal(), "{} left {:?}", todo.id, todo.status);
    }
    assert_eq!(
        ledger.todo(&PhaseId::GAPS.todo_id()).unwrap().status,
        TodoStatus::Cancelled
    );
}

#[tokio::test]
async fn test_status_events_follow_phase_order() {
    let (tx, mut rx) = mpsc::channel::<StatusEvent>(256);
    let agent = Arc::new(PhaseScript::new().reply(2, NOT_FLAGGED).fail_on(5));
    let executor = PhaseExecutor::new(agent)
        .with_reporter(StatusReporter::new().with_event_channel(tx));
    let runner = PlaybookRunner::new(executor);

    let ledger = runner.execute(params()).await.unwrap();
    drop(runner);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    for phase in ledger.phases_completed() {
        let statuses: Vec<PhaseStatus> = events
            .iter()
            .filter(|e| e.phase == *phase)
            .map(|e| e.status)
            .collect();
        assert_eq!(statuses.first(), Some(&PhaseStatus::Started));
        let terminal = statuses.iter().filter(|s| s.is_terminal()).count();
        assert_eq!(terminal, 1, "phase {} statuses: {:?}", phase, statuses);
        assert!(statuses.last().unwrap().is_terminal());
    }
    let failed = events
        .iter()
        .find(|e| e.phase == PhaseId::BENCHMARK && e.status == PhaseStatus::Error)
        .unwrap();
    assert!(failed.summary.as_deref().unwrap().contains("keyword provider timed out"));

    // Every phase of the run started before the next one did
    let starts: Vec<u8> = events
        .iter()
        .filter(|e| e.status == PhaseStatus::Started)
        .map(|e| e.phase.number())
        .collect();
    assert_eq!(starts, vec![1, 2, 3, 4, 5, 7]);
}

#[tokio::test]
async fn test_status_markers_are_recorded_in_messages() {
    let agent = Arc::new(PhaseScript::new());
    let ledger = runner(agent).execute(params()).await.unwrap();

    let events: Vec<StatusEvent> = ledger
        .messages()
        .iter()
        .flat_map(|m| extract_status_events(&m.content))
        .collect();
    let completed: Vec<u8> = events
        .iter()
        .filter(|e| e.status == PhaseStatus::Completed)
        .map(|e| e.phase.number())
        .collect();
    assert_eq!(completed, vec![1, 2, 3, 4, 5, 7]);
}

#[tokio::test]
async fn test_prompts_carry_earlier_phase_output() {
    let agent = Arc::new(
        PhaseScript::new()
            .reply(1, "Key Findings:\nalpha.com dominates branded search")
            .reply(3, "Key Findings:\nbeta.com has thin category pages"),
    );
    runner(agent.clone()).execute(params()).await.unwrap();

    let first = agent.prompt_for(1).unwrap();
    assert!(!first.contains("Context from Previous Phases"));

    let gaps = agent.prompt_for(4).unwrap();
    assert!(gaps.contains("### Phase 1 Results:"));
    assert!(gaps.contains("alpha.com dominates branded search"));
    assert!(gaps.contains("### Phase 3 Results:"));
    assert!(gaps.contains("beta.com has thin category pages"));
    assert!(!gaps.contains("### Phase 4 Results:"));

    let report = agent.prompt_for(7).unwrap();
    assert!(report.contains("### Phase 5 Results:"));
    assert!(!report.contains("### Phase 6 Results:"));
}

#[tokio::test]
async fn test_report_finalizes_and_collects_files() {
    let agent = Arc::new(
        PhaseScript::new()
            .reply(2, FLAGGED)
            .with_report_file("/tmp/report/audit.md", "# Competitor audit"),
    );
    let ledger: Ledger = runner(agent).execute(params()).await.unwrap();

    assert_eq!(
        ledger.files().get("/tmp/report/audit.md").map(String::as_str),
        Some("# Competitor audit")
    );
    let summary = ledger.execution_summary().unwrap();
    assert_eq!(summary.phases_executed, 7);
    assert_eq!(summary.phases_failed, 0);
    assert!(summary.investigation_executed);
    assert!(matches!(
        ledger.phase_result(PhaseId::REPORT).unwrap().details(),
        PhaseDetails::Report { files } if files.contains_key("/tmp/report/audit.md")
    ));
}
