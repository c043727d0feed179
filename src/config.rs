use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::phase::DEFAULT_PLAYBOOK_ID;
use crate::playbook_config::{CONFIG_FILE, PlaybookToml};
use crate::prompt::templates_dir_for;

/// Name of the per-project state directory.
pub const PLAYBOOK_DIR: &str = ".playbook";

/// Path of the playbook directory for a project.
pub fn get_playbook_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(PLAYBOOK_DIR)
}

/// Runtime configuration for the playbook runner.
///
/// Resolves the on-disk layout under `.playbook/` and the effective settings
/// of `playbook.toml` after environment overrides.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub playbook_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub log_dir: PathBuf,
    pub agent_cmd: String,
    pub agent_args: Vec<String>,
    pub verbose: bool,
    toml: PlaybookToml,
}

impl Config {
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let playbook_dir = get_playbook_dir(&project_dir);
        let toml = PlaybookToml::load_or_default(&playbook_dir)?;

        Ok(Self {
            runs_dir: playbook_dir.join("runs"),
            log_dir: playbook_dir.join("logs"),
            agent_cmd: toml.agent_cmd(),
            agent_args: toml.agent_args(),
            project_dir,
            playbook_dir,
            verbose,
            toml,
        })
    }

    /// The parsed `playbook.toml` (defaults when absent).
    pub fn toml(&self) -> &PlaybookToml {
        &self.toml
    }

    pub fn config_file(&self) -> PathBuf {
        self.playbook_dir.join(CONFIG_FILE)
    }

    pub fn is_initialized(&self) -> bool {
        self.playbook_dir.exists()
    }

    pub fn playbook_id(&self) -> &str {
        let id = self.toml.run.playbook_id.trim();
        if id.is_empty() { DEFAULT_PLAYBOOK_ID } else { id }
    }

    /// Market for runs that do not pass `--market`.
    pub fn default_market(&self) -> String {
        self.toml.default_market()
    }

    pub fn max_context_chars(&self) -> usize {
        self.toml.context.max_chars_per_phase
    }

    pub fn summary_max_chars(&self) -> usize {
        self.toml.context.summary_max_chars
    }

    pub fn embed_status_markers(&self) -> bool {
        self.toml.run.embed_status_markers
    }

    pub fn event_buffer(&self) -> usize {
        self.toml.run.event_buffer.max(1)
    }

    /// Directory with the phase templates of the configured playbook, if any.
    ///
    /// `run.templates_dir` is resolved against `.playbook/`; the playbook's
    /// `<id>-phases` subdirectory is used.
    pub fn templates_dir(&self) -> Option<PathBuf> {
        self.toml
            .run
            .templates_dir
            .as_ref()
            .map(|root| templates_dir_for(&self.playbook_dir.join(root), self.playbook_id()))
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.runs_dir).context("Failed to create runs directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }
}
