//! Playbook run progress UI.
//!
//! Renders `StatusEvent`s from the executor's event channel. It supports
//! multiple output modes:
//! - `full`: Rich terminal UI with a phase bar, a spinner and colors
//! - `minimal`: One line per status event
//! - `json`: Each event as a JSON line for machine consumption

use crate::ledger::{AuditParams, Ledger};
use crate::phase::{PhaseId, TOTAL_PHASES};
use crate::signals::{PhaseStatus, StatusEvent};
use crate::ui::icons::{CHECK, CLOCK, CROSS, FILE_NEW, FOLDER, ROUTE, RUNNING, SPARKLE, TARGET};
use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Output mode for the run UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    /// Rich terminal UI with progress bars
    #[default]
    Full,
    /// Single-line status updates
    Minimal,
    /// JSON-formatted events
    Json,
}

impl std::str::FromStr for UiMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "minimal" => Self::Minimal,
            _ => Self::Full,
        })
    }
}

impl UiMode {
    /// Parse UI mode from string (convenience method).
    pub fn parse(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

/// Terminal UI for one playbook run.
///
/// Owned by a single task draining the status channel, so the phase bar
/// mutex is only ever locked briefly and never recursively.
pub struct PlaybookUI {
    mode: UiMode,
    multi: MultiProgress,
    /// Overall progress across the seven phases
    header_bar: ProgressBar,
    /// Spinner for the running phase
    phase_bar: Mutex<Option<ProgressBar>>,
    verbose: bool,
    term: Term,
}

impl PlaybookUI {
    pub fn new(mode: UiMode, verbose: bool) -> Self {
        let multi = match mode {
            UiMode::Full => MultiProgress::new(),
            _ => MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        };

        let header_style = ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:35.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓░");
        let header_bar = multi.add(ProgressBar::new(TOTAL_PHASES as u64));
        header_bar.set_style(header_style);
        header_bar.set_prefix("Audit");
        header_bar.set_message("Starting...");

        Self {
            mode,
            multi,
            header_bar,
            phase_bar: Mutex::new(None),
            verbose,
            term: Term::stdout(),
        }
    }

    pub fn mode(&self) -> UiMode {
        self.mode
    }

    /// Print the run banner.
    pub fn start_run(&self, params: &AuditParams) {
        match self.mode {
            UiMode::Json => {}
            UiMode::Minimal => {
                let _ = writeln!(
                    &self.term,
                    "Auditing {} ({})",
                    params.competitor_domains.join(", "),
                    params.primary_market
                );
            }
            UiMode::Full => {
                self.multi.println("").ok();
                self.multi
                    .println(format!(
                        "{}{}",
                        TARGET,
                        style("Competitor SEO Growth Engine Audit").bold()
                    ))
                    .ok();
                self.multi
                    .println(format!(
                        "   Competitors: {}",
                        style(params.competitor_domains.join(", ")).cyan()
                    ))
                    .ok();
                if let Some(mine) = &params.my_domain {
                    self.multi
                        .println(format!("   Your domain: {}", style(mine).cyan()))
                        .ok();
                }
                self.multi
                    .println(format!("   Market: {}", style(&params.primary_market).cyan()))
                    .ok();
                self.multi.println("").ok();
            }
        }
    }

    /// Render one status event.
    pub fn handle_event(&self, event: &StatusEvent) {
        match self.mode {
            UiMode::Json => self.handle_json(event),
            UiMode::Minimal => self.handle_minimal(event),
            UiMode::Full => self.handle_full(event),
        }
    }

    fn handle_json(&self, event: &StatusEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(&self.term, "{}", json);
        }
    }

    fn handle_minimal(&self, event: &StatusEvent) {
        let phase = event.phase;
        let line = match event.status {
            PhaseStatus::Started => format!("[{}/{}] {}", phase, TOTAL_PHASES, phase.display_name()),
            PhaseStatus::Progress if self.verbose => format!(
                "[{}/{}]   {}",
                phase,
                TOTAL_PHASES,
                event.summary.as_deref().unwrap_or("working")
            ),
            PhaseStatus::Progress => return,
            PhaseStatus::Completed => format!(
                "[{}/{}] ✓ {} ({})",
                phase,
                TOTAL_PHASES,
                event.summary.as_deref().unwrap_or("done"),
                event.duration.as_deref().unwrap_or("-")
            ),
            PhaseStatus::Error => format!(
                "[{}/{}] ✗ {}",
                phase,
                TOTAL_PHASES,
                event.summary.as_deref().unwrap_or("failed")
            ),
        };
        let _ = writeln!(&self.term, "{}", line);
    }

    fn handle_full(&self, event: &StatusEvent) {
        match event.status {
            PhaseStatus::Started => self.on_phase_started(event.phase),
            PhaseStatus::Progress => self.on_phase_progress(event),
            PhaseStatus::Completed | PhaseStatus::Error => self.on_phase_finished(event),
        }
    }

    fn on_phase_started(&self, phase: PhaseId) {
        if phase == PhaseId::INVESTIGATION || phase == PhaseId::REPORT {
            // Reaching 6 or 7 right after 5 shows the routing decision
            let passed = self.header_bar.position();
            if passed == u64::from(PhaseId::BENCHMARK.number()) {
                let route = if phase == PhaseId::INVESTIGATION {
                    "fluctuations flagged, investigating"
                } else {
                    // Phase 6 never runs on this path
                    self.header_bar.inc(1);
                    "no fluctuations flagged, skipping investigation"
                };
                self.multi
                    .println(format!("  {}{}", ROUTE, style(route).dim()))
                    .ok();
            }
        }

        let spinner_style = ProgressStyle::default_spinner()
            .template("  {spinner:.cyan} {prefix:.bold} {msg} {elapsed:.dim}")
            .expect("progress bar template is a valid static string");
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix(format!("[{}/{}]", phase, TOTAL_PHASES));
        bar.set_message(format!("{}{}", RUNNING, phase.display_name()));
        bar.enable_steady_tick(Duration::from_millis(100));

        self.header_bar.set_message(phase.display_name().to_string());
        if let Ok(mut current) = self.phase_bar.lock()
            && let Some(stale) = current.replace(bar)
        {
            stale.finish_and_clear();
        }
    }

    fn on_phase_progress(&self, event: &StatusEvent) {
        let Some(summary) = event.summary.as_deref() else {
            return;
        };
        if let Ok(current) = self.phase_bar.lock()
            && let Some(bar) = current.as_ref()
        {
            bar.set_message(format!(
                "{} {}",
                event.phase.display_name(),
                style(summary).dim()
            ));
        }
    }

    fn on_phase_finished(&self, event: &StatusEvent) {
        if let Ok(mut current) = self.phase_bar.lock()
            && let Some(bar) = current.take()
        {
            bar.finish_and_clear();
        }
        self.header_bar.inc(1);

        let phase = event.phase;
        let duration = event.duration.as_deref().unwrap_or("-");
        let summary = event.summary.as_deref().unwrap_or_default();
        if event.status == PhaseStatus::Completed {
            self.multi
                .println(format!(
                    "  {}Phase {} {} ({})",
                    CHECK,
                    style(phase).green().bold(),
                    phase.display_name(),
                    style(duration).cyan()
                ))
                .ok();
        } else {
            self.multi
                .println(format!(
                    "  {}Phase {} {} {}",
                    CROSS,
                    style(phase).red().bold(),
                    phase.display_name(),
                    style("failed").red()
                ))
                .ok();
        }
        if !summary.is_empty() {
            self.multi.println(self.wrap_detail(summary)).ok();
        }
    }

    fn wrap_detail(&self, text: &str) -> String {
        let width = (self.term.size().1 as usize).clamp(40, 100);
        let options = textwrap::Options::new(width)
            .initial_indent("     ")
            .subsequent_indent("     ");
        style(textwrap::fill(text, options)).dim().to_string()
    }

    /// Print the final run summary.
    pub fn finish(&self, ledger: &Ledger, run_dir: Option<&Path>) {
        self.header_bar.finish_and_clear();
        match self.mode {
            UiMode::Json => self.finish_json(ledger, run_dir),
            UiMode::Minimal => {
                let failed = ledger.phase_results().filter(|r| !r.success).count();
                let _ = writeln!(
                    &self.term,
                    "Done: {} phases, {} failed{}",
                    ledger.phases_completed().len(),
                    failed,
                    run_dir
                        .map(|d| format!(", audit: {}", d.display()))
                        .unwrap_or_default()
                );
            }
            UiMode::Full => self.finish_full(ledger, run_dir),
        }
    }

    fn finish_json(&self, ledger: &Ledger, run_dir: Option<&Path>) {
        let completed: Vec<u8> = ledger.phases_completed().iter().map(|p| p.number()).collect();
        let event = serde_json::json!({
            "type": "run_completed",
            "run_id": ledger.run_id(),
            "phases_completed": completed,
            "errors": ledger.errors(),
            "execution_summary": ledger.execution_summary(),
            "audit_dir": run_dir.map(|d| d.display().to_string()),
        });
        let _ = writeln!(&self.term, "{}", event);
    }

    fn finish_full(&self, ledger: &Ledger, run_dir: Option<&Path>) {
        let failed = ledger.phase_results().filter(|r| !r.success).count();
        let rule = style("═".repeat(60)).cyan().to_string();

        self.multi.println("").ok();
        self.multi.println(&rule).ok();
        if failed == 0 {
            self.multi
                .println(format!(
                    "{}Audit {} {}",
                    SPARKLE,
                    style("COMPLETE").green().bold(),
                    SPARKLE
                ))
                .ok();
        } else {
            self.multi
                .println(format!(
                    "{}Audit finished with {} failed phase(s)",
                    CROSS,
                    style(failed).red().bold()
                ))
                .ok();
        }
        self.multi.println(&rule).ok();
        self.multi.println("").ok();

        let completed: Vec<String> = ledger
            .phases_completed()
            .iter()
            .map(|p| p.to_string())
            .collect();
        self.multi
            .println(format!(
                "{} Phases: {} ({})",
                CLOCK,
                style(completed.len()).green().bold(),
                completed.join(" → ")
            ))
            .ok();
        if let Some(summary) = ledger.execution_summary() {
            self.multi
                .println(format!(
                    "     Duration: {}",
                    style(format_elapsed(summary.elapsed)).cyan()
                ))
                .ok();
        }
        if ledger.has_errors() {
            self.multi
                .println(format!("     {}", style("Errors:").red().bold()))
                .ok();
            for error in ledger.errors() {
                self.multi
                    .println(format!("       {}", style(error).red()))
                    .ok();
            }
        }

        if self.verbose {
            self.multi.println("").ok();
            self.multi
                .println(format!("{}", style("Phase breakdown:").underlined()))
                .ok();
            for record in ledger.phase_results() {
                let status = if record.success {
                    style("✓").green()
                } else {
                    style("✗").red()
                };
                self.multi
                    .println(format!(
                        "  {} {} {} ({})",
                        status,
                        record.phase,
                        record.phase.display_name(),
                        record.formatted_duration()
                    ))
                    .ok();
            }
        }

        if !ledger.files().is_empty() {
            self.multi.println("").ok();
            for name in ledger.files().keys() {
                self.multi.println(format!("  {}{}", FILE_NEW, name)).ok();
            }
        }
        if let Some(dir) = run_dir {
            self.multi
                .println(format!("  {}Audit trail: {}", FOLDER, style(dir.display()).dim()))
                .ok();
        }
        self.multi.println("").ok();
    }
}

/// Format a run's wall-clock time.
fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", d.as_millis())
    }
}
