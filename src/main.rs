use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

mod cmd;

#[derive(Parser)]
#[command(name = "playbook")]
#[command(version, about = "Agent-driven competitor SEO audit playbook")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Emit log lines as JSON on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a .playbook directory in the project
    Init,
    /// Execute the seven-phase audit playbook
    Run {
        /// Competitor domain to audit (repeatable)
        #[arg(short, long = "competitor", required = true)]
        competitors: Vec<String>,

        /// Your own domain, used for keyword gap analysis
        #[arg(long)]
        my_domain: Option<String>,

        /// Market code (defaults to playbook.toml or "us")
        #[arg(long)]
        market: Option<String>,

        /// UI output mode: full, minimal, json
        #[arg(long, default_value = "full")]
        ui: String,

        /// Do not write the run audit trail
        #[arg(long)]
        no_audit: bool,
    },
    /// Print the prompt a phase would be sent, without running anything
    Render {
        /// Phase number (1-7)
        #[arg(short, long)]
        phase: String,

        /// Competitor domain (repeatable)
        #[arg(short, long = "competitor", required = true)]
        competitors: Vec<String>,

        #[arg(long)]
        my_domain: Option<String>,

        #[arg(long)]
        market: Option<String>,
    },
    /// List the playbook phases and how they are wired
    Phases,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default playbook.toml file
    Init,
}

/// Install the stderr subscriber, plus a file layer once `.playbook/logs` exists.
///
/// The returned guard flushes the file writer on drop and must outlive the run.
fn init_tracing(cli: &Cli, project_dir: &Path) -> Option<WorkerGuard> {
    let default_directive = if cli.verbose {
        "playbook=debug"
    } else {
        "playbook=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let stderr_layer = if cli.log_json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let log_dir = playbook::config::get_playbook_dir(project_dir).join("logs");
    let (file_layer, guard) = if log_dir.is_dir() {
        let appender = tracing_appender::rolling::never(&log_dir, "playbook.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_ansi(false).with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let _log_guard = init_tracing(&cli, &project_dir);

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Run {
            competitors,
            my_domain,
            market,
            ui,
            no_audit,
        } => {
            let args = cmd::RunArgs {
                competitors: competitors.clone(),
                my_domain: my_domain.clone(),
                market: market.clone(),
                ui: ui.clone(),
                no_audit: *no_audit,
            };
            cmd::cmd_run(&cli, project_dir, args).await?;
        }
        Commands::Render {
            phase,
            competitors,
            my_domain,
            market,
        } => cmd::cmd_render(
            &project_dir,
            phase,
            competitors,
            my_domain.as_deref(),
            market.as_deref(),
        )?,
        Commands::Phases => cmd::cmd_phases()?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
