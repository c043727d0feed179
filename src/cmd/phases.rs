//! Phase listing and prompt preview - `playbook phases`, `playbook render`.

use anyhow::Result;
use std::path::Path;

pub fn cmd_phases() -> Result<()> {
    use playbook::phase::PhaseId;
    use playbook::workflow::WorkflowBuilder;

    let workflow = WorkflowBuilder::audit_playbook().build()?;

    println!();
    println!("{:<8} {:<26} Wiring", "Phase", "Name");
    println!("{:<8} {:<26} ------", "--------", "--------------------------");
    for (phase, transition) in workflow.edges() {
        let name = if phase.is_optional() {
            format!("{} (conditional)", phase.display_name())
        } else {
            phase.display_name().to_string()
        };
        println!("{:<8} {:<26} {}", phase.number(), name, transition);
    }
    println!();

    let width = (console::Term::stdout().size().1 as usize).clamp(40, 100);
    let options = textwrap::Options::new(width)
        .initial_indent("  ")
        .subsequent_indent("  ");
    println!("Routing:");
    println!(
        "{}",
        textwrap::fill(
            &format!(
                "After phase {} the run continues with phase {} when phase {} flagged a \
                 traffic fluctuation, otherwise it skips straight to phase {}.",
                PhaseId::BENCHMARK,
                PhaseId::INVESTIGATION,
                PhaseId::HISTORY,
                PhaseId::REPORT
            ),
            options
        )
    );
    println!();
    Ok(())
}

pub fn cmd_render(
    project_dir: &Path,
    phase: &str,
    competitors: &[String],
    my_domain: Option<&str>,
    market: Option<&str>,
) -> Result<()> {
    use playbook::config::Config;
    use playbook::ledger::{AuditParams, PriorContext};
    use playbook::phase::PhaseId;
    use playbook::prompt::{PromptRenderer, TemplateRenderer};

    let phase: PhaseId = phase.parse()?;
    let config = Config::new(project_dir.to_path_buf(), false)?;

    let mut params = AuditParams::new(competitors.to_vec())
        .with_market(market.map(str::to_string).unwrap_or_else(|| config.default_market()));
    if let Some(mine) = my_domain {
        params = params.with_my_domain(mine);
    }
    params.validate()?;

    let renderer = match config.templates_dir() {
        Some(dir) => TemplateRenderer::with_templates_dir(dir),
        None => TemplateRenderer::new(),
    };
    let prompt = renderer.render(phase, &params, &PriorContext::default())?;
    println!("{}", prompt);
    Ok(())
}
