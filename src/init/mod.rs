//! Initialization of the per-project `.playbook/` directory.
//!
//! ```text
//! .playbook/
//! ├── playbook.toml    # Run configuration
//! ├── runs/            # Audit trail, one directory per run
//! ├── logs/            # playbook.log
//! └── templates/       # or `run.templates_dir`
//!     └── <playbook_id>-phases/
//!         └── phase_<n>.txt   # Editable phase bodies
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::get_playbook_dir;
use crate::phase::{DEFAULT_PLAYBOOK_ID, PhaseId};
use crate::playbook_config::{CONFIG_FILE, PlaybookToml};
use crate::prompt::templates_dir_for;

/// Directory under `.playbook/` holding phase templates.
pub const TEMPLATES_DIR: &str = "templates";

/// Result of initializing a playbook project.
#[derive(Debug)]
pub struct InitResult {
    /// Path to the `.playbook` directory
    pub playbook_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
    /// Template files written by this call
    pub templates_written: usize,
}

/// Initialize a playbook project in the given directory.
///
/// Missing pieces of an existing layout are filled in; existing files are
/// never overwritten.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let playbook_dir = get_playbook_dir(project_dir);
    let created = !playbook_dir.exists();

    std::fs::create_dir_all(&playbook_dir)
        .with_context(|| format!("Failed to create directory: {}", playbook_dir.display()))?;
    for sub in ["runs", "logs"] {
        let dir = playbook_dir.join(sub);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {} directory: {}", sub, dir.display()))?;
    }

    let config_path = playbook_dir.join(CONFIG_FILE);
    let toml = if config_path.exists() {
        PlaybookToml::load(&config_path)?
    } else {
        let mut toml = PlaybookToml::default();
        toml.run.templates_dir = Some(PathBuf::from(TEMPLATES_DIR));
        toml.save(&config_path)?;
        toml
    };

    let playbook_id = match toml.run.playbook_id.trim() {
        "" => DEFAULT_PLAYBOOK_ID,
        id => id,
    };
    let templates_root = toml
        .run
        .templates_dir
        .as_deref()
        .unwrap_or(Path::new(TEMPLATES_DIR));
    let templates_dir = templates_dir_for(&playbook_dir.join(templates_root), playbook_id);
    let templates_written = seed_templates(&templates_dir)?;

    Ok(InitResult {
        playbook_dir,
        created,
        templates_written,
    })
}

/// Write the built-in brief of every phase that has no template yet.
fn seed_templates(dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create templates directory: {}", dir.display()))?;

    let mut written = 0;
    for phase in PhaseId::ALL {
        let path = dir.join(format!("phase_{}.txt", phase.number()));
        if path.exists() {
            continue;
        }
        std::fs::write(&path, phase.brief())
            .with_context(|| format!("Failed to write template: {}", path.display()))?;
        written += 1;
    }
    Ok(written)
}

/// Check if a project is already initialized.
pub fn is_initialized(project_dir: &Path) -> bool {
    get_playbook_dir(project_dir).exists()
}
