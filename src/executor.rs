//! Phase executor: one uniform contract for all seven phases.
//!
//! A phase run renders a prompt from the ledger, invokes the research agent,
//! distills the reply into a phase record and advances the ledger. Any
//! failure while rendering, invoking or recording is contained here: the
//! phase is recorded as failed, the run-level error list gains an entry and
//! the ledger still advances, so the workflow walks on to the next phase.

use crate::agent::{AgentResponse, ResearchAgent};
use crate::errors::{LedgerError, PhaseError};
use crate::ledger::{
    AgentMessage, AuditParams, Ledger, PhaseDetails, PhaseRecord, format_duration,
};
use crate::phase::PhaseId;
use crate::prompt::{PromptRenderer, TemplateRenderer};
use crate::signals::{KeywordHeuristics, OutputHeuristics, PhaseStatus, StatusEvent};
use crate::status::StatusReporter;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default per-phase character budget for earlier-phase context.
pub const DEFAULT_CONTEXT_CHARS: usize = 3000;

/// What a phase run reports back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseOutcome {
    pub phase: PhaseId,
    pub success: bool,
    pub summary: String,
    pub duration: Duration,
}

/// Output of the fallible part of a phase run.
struct Attempt {
    summary: String,
    duration: Duration,
    messages: Vec<AgentMessage>,
    files: BTreeMap<String, String>,
}

pub struct PhaseExecutor {
    agent: Arc<dyn ResearchAgent>,
    renderer: Arc<dyn PromptRenderer>,
    heuristics: Arc<dyn OutputHeuristics>,
    reporter: StatusReporter,
    max_context_chars: usize,
}

impl PhaseExecutor {
    /// Executor with the built-in renderer, keyword heuristics and a marker-only reporter.
    pub fn new(agent: Arc<dyn ResearchAgent>) -> Self {
        Self {
            agent,
            renderer: Arc::new(TemplateRenderer::new()),
            heuristics: Arc::new(KeywordHeuristics::default()),
            reporter: StatusReporter::new(),
            max_context_chars: DEFAULT_CONTEXT_CHARS,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PromptRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_heuristics(mut self, heuristics: Arc<dyn OutputHeuristics>) -> Self {
        self.heuristics = heuristics;
        self
    }

    pub fn with_reporter(mut self, reporter: StatusReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_context_budget(mut self, max_chars: usize) -> Self {
        self.max_context_chars = max_chars;
        self
    }

    /// Run one phase against the ledger.
    ///
    /// Phase failures never surface here; they are recorded in the ledger.
    /// The only error is a violated ledger invariant, which means the phase
    /// was scheduled out of order.
    pub async fn run(&self, phase: PhaseId, ledger: &mut Ledger) -> Result<PhaseOutcome, LedgerError> {
        info!(phase = phase.number(), name = phase.display_name(), "phase started");
        self.reporter
            .report(ledger, StatusEvent::new(phase, PhaseStatus::Started))
            .await;

        let start = Instant::now();
        let outcome = match self.attempt(phase, ledger, start).await {
            Ok(attempt) => {
                ledger.record_attempt(phase)?;
                if let Some(next) = phase.next() {
                    ledger.advance_phase(next)?;
                }
                let stored = ledger.append_messages(attempt.messages);
                if !attempt.files.is_empty() {
                    info!(phase = phase.number(), files = attempt.files.len(), "merging artifact files");
                    ledger.merge_files(&attempt.files);
                }
                self.finish_run_if_last(phase, ledger);

                let duration = format_duration(attempt.duration);
                info!(
                    phase = phase.number(),
                    duration_ms = attempt.duration.as_millis() as u64,
                    messages = stored,
                    summary = %attempt.summary,
                    "phase completed"
                );
                self.reporter
                    .report(
                        ledger,
                        StatusEvent::new(phase, PhaseStatus::Completed)
                            .with_summary(attempt.summary.clone())
                            .with_duration(duration),
                    )
                    .await;

                PhaseOutcome {
                    phase,
                    success: true,
                    summary: attempt.summary,
                    duration: attempt.duration,
                }
            }
            Err(err) => {
                let duration = start.elapsed();
                let message = err.to_string();
                warn!(phase = phase.number(), error = %message, "phase failed");

                let record =
                    PhaseRecord::failure(phase, message.clone(), duration, failure_details(phase))?;
                ledger.set_phase_result(record)?;
                ledger.append_error(format!("Phase {} failed: {}", phase, message));
                ledger.record_attempt(phase)?;
                if let Some(next) = phase.next() {
                    ledger.advance_phase(next)?;
                }
                self.finish_run_if_last(phase, ledger);

                self.reporter
                    .report(
                        ledger,
                        StatusEvent::new(phase, PhaseStatus::Error)
                            .with_summary(message.clone())
                            .with_duration(format_duration(duration)),
                    )
                    .await;

                PhaseOutcome {
                    phase,
                    success: false,
                    summary: message,
                    duration,
                }
            }
        };
        Ok(outcome)
    }

    /// Render, invoke, summarize and record. Everything in here may fail.
    async fn attempt(
        &self,
        phase: PhaseId,
        ledger: &mut Ledger,
        start: Instant,
    ) -> Result<Attempt, PhaseError> {
        let prior = ledger.prior_context(phase, self.max_context_chars);
        let prompt = self
            .renderer
            .render(phase, ledger.params(), &prior)
            .map_err(PhaseError::Render)?;
        debug!(
            phase = phase.number(),
            chars = prompt.len(),
            context_sections = prior.sections.len(),
            "prompt rendered"
        );
        self.reporter
            .report(
                ledger,
                StatusEvent::new(phase, PhaseStatus::Progress).with_summary(format!(
                    "Prompt ready ({} chars), waiting for research agent",
                    prompt.chars().count()
                )),
            )
            .await;

        let response = self.agent.invoke(&prompt).await.map_err(PhaseError::Agent)?;
        let duration = start.elapsed();

        let text = response.final_text().to_string();
        let summary = self.heuristics.summarize(&text, phase);
        let details = self.phase_details(phase, &text, ledger.params(), &response);
        let record = PhaseRecord::success(phase, summary.clone(), text, duration, details)?;
        ledger.set_phase_result(record)?;

        let AgentResponse { messages, files } = response;
        Ok(Attempt {
            summary,
            duration,
            messages,
            files,
        })
    }

    fn phase_details(
        &self,
        phase: PhaseId,
        text: &str,
        params: &AuditParams,
        response: &AgentResponse,
    ) -> PhaseDetails {
        match phase {
            PhaseId::HISTORY => {
                let requires_investigation = self.heuristics.classify_fluctuation(text);
                let investigation_domains = if requires_investigation {
                    self.heuristics.flagged_domains(text, &params.all_domains())
                } else {
                    Vec::new()
                };
                info!(
                    requires_investigation,
                    flagged = investigation_domains.len(),
                    "fluctuation check complete"
                );
                PhaseDetails::History {
                    requires_investigation,
                    investigation_domains,
                }
            }
            PhaseId::GAPS => PhaseDetails::Gaps {
                has_my_domain: params.my_domain.is_some(),
            },
            PhaseId::INVESTIGATION => PhaseDetails::Investigation { executed: true },
            PhaseId::REPORT => PhaseDetails::Report {
                files: response.files.clone(),
            },
            _ => PhaseDetails::General,
        }
    }

    fn finish_run_if_last(&self, phase: PhaseId, ledger: &mut Ledger) {
        if phase != PhaseId::REPORT {
            return;
        }
        let summary = ledger.finalize();
        info!(
            phases_executed = summary.phases_executed,
            phases_failed = summary.phases_failed,
            errors = summary.errors.len(),
            "execution summary recorded"
        );
    }
}

/// Details written with a failed record.
///
/// A failed historical-trends phase pins the routing flag to `false` so the
/// router always has a defined input.
fn failure_details(phase: PhaseId) -> PhaseDetails {
    if phase == PhaseId::HISTORY {
        PhaseDetails::History {
            requires_investigation: false,
            investigation_domains: Vec::new(),
        }
    } else {
        PhaseDetails::General
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Role, TodoStatus};
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    /// Replies with a fixed text and records every prompt it receives.
    struct ScriptedAgent {
        reply: String,
        files: BTreeMap<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedAgent {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                files: BTreeMap::new(),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn with_file(mut self, name: &str, content: &str) -> Self {
            self.files.insert(name.to_string(), content.to_string());
            self
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResearchAgent for ScriptedAgent {
        async fn invoke(&self, prompt: &str) -> Result<AgentResponse> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(AgentResponse {
                messages: vec![
                    AgentMessage::new(Role::User, prompt),
                    AgentMessage::tool("WebSearch: traffic"),
                    AgentMessage::assistant(self.reply.clone()),
                ],
                files: self.files.clone(),
            })
        }
    }

    struct FailingAgent;

    #[async_trait]
    impl ResearchAgent for FailingAgent {
        async fn invoke(&self, _prompt: &str) -> Result<AgentResponse> {
            bail!("provider quota exceeded")
        }
    }

    struct EmptyAgent;

    #[async_trait]
    impl ResearchAgent for EmptyAgent {
        async fn invoke(&self, _prompt: &str) -> Result<AgentResponse> {
            Ok(AgentResponse::default())
        }
    }

    fn ledger() -> Ledger {
        Ledger::new(AuditParams::new(vec!["alpha.com".to_string(), "beta.com".to_string()]))
    }

    fn executor(agent: impl ResearchAgent + 'static) -> PhaseExecutor {
        PhaseExecutor::new(Arc::new(agent))
    }

    async fn run_through_benchmark(ledger: &mut Ledger) {
        let exec = executor(ScriptedAgent::new("Summary:\nNothing unusual in this phase"));
        for phase in &PhaseId::ALL[..5] {
            exec.run(*phase, ledger).await.unwrap();
        }
    }

    // =========================================================================
    // Success path
    // =========================================================================

    #[tokio::test]
    async fn test_success_records_result_and_advances() {
        let mut ledger = ledger();
        let outcome = executor(ScriptedAgent::new(
            "Key Findings:\n- Alpha has twice the organic traffic of Beta",
        ))
        .run(PhaseId::OVERVIEW, &mut ledger)
        .await
        .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.summary, "Alpha has twice the organic traffic of Beta");
        let record = ledger.phase_result(PhaseId::OVERVIEW).unwrap();
        assert!(record.success);
        assert!(record.detail.starts_with("Key Findings:"));
        assert_eq!(ledger.phases_completed(), &[PhaseId::OVERVIEW]);
        assert_eq!(ledger.current_phase(), PhaseId::HISTORY);
        assert_eq!(ledger.todo("phase_1").unwrap().status, TodoStatus::Completed);
    }

    #[tokio::test]
    async fn test_success_stores_only_agent_messages() {
        let mut ledger = ledger();
        executor(ScriptedAgent::new("done"))
            .with_reporter(StatusReporter::new().with_markers(false))
            .run(PhaseId::OVERVIEW, &mut ledger)
            .await
            .unwrap();
        let roles: Vec<Role> = ledger.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Tool, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_empty_response_uses_canned_summary() {
        let mut ledger = ledger();
        let outcome = executor(EmptyAgent)
            .run(PhaseId::OVERVIEW, &mut ledger)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.summary, PhaseId::OVERVIEW.default_summary());
        assert_eq!(ledger.phase_result(PhaseId::OVERVIEW).unwrap().detail, "");
    }

    #[tokio::test]
    async fn test_events_follow_started_progress_completed() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut ledger = ledger();
        executor(ScriptedAgent::new("ok"))
            .with_reporter(StatusReporter::new().with_event_channel(tx))
            .run(PhaseId::OVERVIEW, &mut ledger)
            .await
            .unwrap();
        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            statuses.push(event.status);
        }
        assert_eq!(
            statuses,
            vec![PhaseStatus::Started, PhaseStatus::Progress, PhaseStatus::Completed]
        );
    }

    // =========================================================================
    // Failure path
    // =========================================================================

    #[tokio::test]
    async fn test_agent_failure_is_contained() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut ledger = ledger();
        let outcome = executor(FailingAgent)
            .with_reporter(StatusReporter::new().with_event_channel(tx))
            .run(PhaseId::OVERVIEW, &mut ledger)
            .await
            .unwrap();

        assert!(!outcome.success);
        let record = ledger.phase_result(PhaseId::OVERVIEW).unwrap();
        assert!(!record.success);
        assert!(record.error.as_deref().unwrap().contains("provider quota exceeded"));
        assert_eq!(ledger.errors().len(), 1);
        assert!(ledger.errors()[0].starts_with("Phase 1 failed:"));
        assert_eq!(ledger.phases_completed(), &[PhaseId::OVERVIEW]);
        assert_eq!(ledger.current_phase(), PhaseId::HISTORY);
        assert_eq!(ledger.todo("phase_1").unwrap().status, TodoStatus::Cancelled);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let last = events.last().unwrap();
        assert_eq!(last.status, PhaseStatus::Error);
        assert!(last.summary.as_deref().unwrap().contains("provider quota exceeded"));
    }

    #[tokio::test]
    async fn test_render_failure_skips_agent() {
        let dir = tempdir().unwrap();
        let agent = Arc::new(ScriptedAgent::new("never"));
        let mut ledger = ledger();
        let outcome = PhaseExecutor::new(agent.clone())
            .with_renderer(Arc::new(TemplateRenderer::with_templates_dir(dir.path())))
            .run(PhaseId::OVERVIEW, &mut ledger)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.summary.contains("Prompt rendering failed"));
        assert!(agent.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_running_same_phase_twice_is_rejected() {
        let mut ledger = ledger();
        let exec = executor(ScriptedAgent::new("ok"));
        exec.run(PhaseId::OVERVIEW, &mut ledger).await.unwrap();
        let err = exec.run(PhaseId::OVERVIEW, &mut ledger).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::ResultAlreadySet {
                phase: PhaseId::OVERVIEW
            }
        );
    }

    // =========================================================================
    // Phase-specific details
    // =========================================================================

    #[tokio::test]
    async fn test_history_sets_routing_flag_on_fluctuation() {
        let mut ledger = ledger();
        let exec = executor(ScriptedAgent::new(
            "beta.com dropped 45% in March.\nPhase 6 Investigation Required: Yes",
        ));
        exec.run(PhaseId::OVERVIEW, &mut ledger).await.unwrap();
        exec.run(PhaseId::HISTORY, &mut ledger).await.unwrap();
        assert!(ledger.routing_flag());
        match ledger.phase_result(PhaseId::HISTORY).unwrap().details() {
            PhaseDetails::History {
                investigation_domains,
                ..
            } => assert_eq!(investigation_domains, &vec!["beta.com".to_string()]),
            other => panic!("Expected History details, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_history_negative_marker_keeps_flag_false() {
        let mut ledger = ledger();
        let exec = executor(ScriptedAgent::new(
            "Fluctuations detected: none material.\nInvestigation: No",
        ));
        exec.run(PhaseId::OVERVIEW, &mut ledger).await.unwrap();
        exec.run(PhaseId::HISTORY, &mut ledger).await.unwrap();
        assert!(!ledger.routing_flag());
    }

    #[tokio::test]
    async fn test_history_failure_pins_flag_false() {
        let mut ledger = ledger();
        executor(ScriptedAgent::new("ok"))
            .run(PhaseId::OVERVIEW, &mut ledger)
            .await
            .unwrap();
        executor(FailingAgent)
            .run(PhaseId::HISTORY, &mut ledger)
            .await
            .unwrap();
        let record = ledger.phase_result(PhaseId::HISTORY).unwrap();
        assert_eq!(
            record.details(),
            &PhaseDetails::History {
                requires_investigation: false,
                investigation_domains: Vec::new()
            }
        );
        assert!(!ledger.routing_flag());
    }

    #[tokio::test]
    async fn test_gaps_records_own_domain_presence() {
        let mut ledger = Ledger::new(
            AuditParams::new(vec!["alpha.com".to_string()]).with_my_domain("mine.com"),
        );
        let exec = executor(ScriptedAgent::new("ok"));
        for phase in &PhaseId::ALL[..4] {
            exec.run(*phase, &mut ledger).await.unwrap();
        }
        assert_eq!(
            ledger.phase_result(PhaseId::GAPS).unwrap().details(),
            &PhaseDetails::Gaps {
                has_my_domain: true
            }
        );
    }

    #[tokio::test]
    async fn test_report_merges_files_and_finalizes() {
        let mut ledger = ledger();
        run_through_benchmark(&mut ledger).await;
        ledger.advance_phase(PhaseId::REPORT).unwrap();

        let agent = ScriptedAgent::new("Highlights:\nAlpha should double down on content")
            .with_file("/report.html", "<html/>");
        executor(agent)
            .run(PhaseId::REPORT, &mut ledger)
            .await
            .unwrap();

        assert_eq!(ledger.files()["/report.html"], "<html/>");
        match ledger.phase_result(PhaseId::REPORT).unwrap().details() {
            PhaseDetails::Report { files } => assert_eq!(files.len(), 1),
            other => panic!("Expected Report details, got {:?}", other),
        }
        assert_eq!(ledger.current_phase(), PhaseId::REPORT);
        let summary = ledger.execution_summary().unwrap();
        assert_eq!(summary.phases_executed, 6);
        assert!(!summary.investigation_executed);
    }

    #[tokio::test]
    async fn test_report_failure_still_finalizes() {
        let mut ledger = ledger();
        run_through_benchmark(&mut ledger).await;
        ledger.advance_phase(PhaseId::REPORT).unwrap();
        executor(FailingAgent)
            .run(PhaseId::REPORT, &mut ledger)
            .await
            .unwrap();
        let summary = ledger.execution_summary().unwrap();
        assert_eq!(summary.phases_failed, 1);
        assert_eq!(summary.errors.len(), 1);
    }

    // =========================================================================
    // Prompt context
    // =========================================================================

    #[tokio::test]
    async fn test_prompt_embeds_truncated_prior_output() {
        let mut ledger = ledger();
        let long = format!("Key Findings:\n{}", "z".repeat(5000));
        executor(ScriptedAgent::new(&long))
            .run(PhaseId::OVERVIEW, &mut ledger)
            .await
            .unwrap();

        let agent = Arc::new(ScriptedAgent::new("ok"));
        PhaseExecutor::new(agent.clone())
            .with_context_budget(100)
            .run(PhaseId::HISTORY, &mut ledger)
            .await
            .unwrap();

        let prompt = &agent.prompts()[0];
        assert!(prompt.contains("### Phase 1 Results:"));
        let expected: String = long.chars().take(100).collect();
        assert!(prompt.contains(&format!("```\n{}\n```", expected)));
        assert!(!prompt.contains(&"z".repeat(200)));
    }
}
