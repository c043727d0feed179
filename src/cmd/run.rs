//! Playbook execution - `playbook run`.

use anyhow::Result;
use std::path::PathBuf;

use super::super::Cli;

/// Arguments of `playbook run`.
pub struct RunArgs {
    pub competitors: Vec<String>,
    pub my_domain: Option<String>,
    pub market: Option<String>,
    pub ui: String,
    pub no_audit: bool,
}

pub async fn cmd_run(cli: &Cli, project_dir: PathBuf, args: RunArgs) -> Result<()> {
    use playbook::agent::CommandAgent;
    use playbook::audit::{AuditLogger, RunConfig};
    use playbook::config::Config;
    use playbook::executor::PhaseExecutor;
    use playbook::ledger::AuditParams;
    use playbook::prompt::TemplateRenderer;
    use playbook::signals::{KeywordHeuristics, StatusEvent};
    use playbook::status::StatusReporter;
    use playbook::ui::{PlaybookUI, UiMode};
    use playbook::workflow::PlaybookRunner;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tracing::{error, info, warn};

    let config = Config::new(project_dir, cli.verbose)?;
    if !config.is_initialized() {
        warn!("no .playbook directory found; using defaults (run `playbook init` to customize)");
    }

    let market = args.market.unwrap_or_else(|| config.default_market());
    let mut params = AuditParams::new(args.competitors).with_market(market);
    if let Some(mine) = args.my_domain {
        params = params.with_my_domain(mine);
    }

    let agent = CommandAgent::new(&config.agent_cmd, config.agent_args.clone())
        .with_working_dir(&config.project_dir);
    info!(agent = %agent.display(), "research agent configured");

    let templates_dir = config.templates_dir();
    let renderer = match &templates_dir {
        Some(dir) => TemplateRenderer::with_templates_dir(dir),
        None => TemplateRenderer::new(),
    };

    let (event_tx, mut event_rx) = mpsc::channel::<StatusEvent>(config.event_buffer());
    let reporter = StatusReporter::new()
        .with_event_channel(event_tx)
        .with_markers(config.embed_status_markers());

    let executor = PhaseExecutor::new(Arc::new(agent))
        .with_renderer(Arc::new(renderer))
        .with_heuristics(Arc::new(KeywordHeuristics::new(config.summary_max_chars())))
        .with_reporter(reporter)
        .with_context_budget(config.max_context_chars());
    let runner = PlaybookRunner::new(executor).with_playbook_id(config.playbook_id());

    let ui = PlaybookUI::new(UiMode::parse(&args.ui), cli.verbose);
    ui.start_run(&params);

    // The channel closes once the runner (and with it the reporter) is dropped.
    let run = async move {
        let result = runner.execute(params).await;
        drop(runner);
        result
    };
    let display = async {
        while let Some(event) = event_rx.recv().await {
            ui.handle_event(&event);
        }
    };
    let (result, ()) = futures::future::join(run, display).await;

    let ledger = match result {
        Ok(ledger) => ledger,
        Err(e) => {
            error!(error = %e, "playbook run aborted");
            return Err(e.into());
        }
    };

    let run_dir = if args.no_audit {
        None
    } else {
        config.ensure_directories()?;
        let run_config = RunConfig {
            agent_cmd: config.agent_cmd.clone(),
            agent_args: config.agent_args.clone(),
            max_context_chars: config.max_context_chars(),
            templates_dir,
            project_dir: config.project_dir.clone(),
        };
        match AuditLogger::new(&config.runs_dir).record_run(run_config, &ledger) {
            Ok(dir) => Some(dir),
            Err(e) => {
                warn!(error = %e, "failed to write audit trail");
                None
            }
        }
    };

    ui.finish(&ledger, run_dir.as_deref());
    Ok(())
}
