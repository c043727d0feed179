use super::{AuditRun, RunConfig};
use crate::ledger::{Ledger, PhaseRecord};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct AuditLogger {
    runs_dir: PathBuf,
}

impl AuditLogger {
    pub fn new(runs_dir: &Path) -> Self {
        Self {
            runs_dir: runs_dir.to_path_buf(),
        }
    }

    /// Directory a ledger's run is written to.
    pub fn run_dir(&self, ledger: &Ledger) -> PathBuf {
        let dirname = format!(
            "{}_{}",
            ledger.started_at().format("%Y-%m-%dT%H-%M-%S"),
            &ledger.run_id().to_string()[..8]
        );
        self.runs_dir.join(dirname)
    }

    /// Write the complete trail of a finished run and return its directory.
    pub fn record_run(&self, config: RunConfig, ledger: &Ledger) -> Result<PathBuf> {
        let run_dir = self.run_dir(ledger);
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        for record in ledger.phase_results() {
            if record.detail.trim().is_empty() {
                continue;
            }
            let path = run_dir.join(format!("phase-{}-output.md", record.phase));
            fs::write(&path, render_phase_output(record))
                .with_context(|| format!("Failed to write phase output: {}", path.display()))?;
        }

        if !ledger.files().is_empty() {
            let artifacts_dir = run_dir.join("artifacts");
            fs::create_dir_all(&artifacts_dir).context("Failed to create artifacts directory")?;
            let mut used = BTreeSet::new();
            for (name, content) in ledger.files() {
                let file_name = unique_name(&artifact_file_name(name), &mut used);
                debug!(source = %name, file = %file_name, "writing artifact");
                fs::write(artifacts_dir.join(&file_name), content)
                    .with_context(|| format!("Failed to write artifact: {}", file_name))?;
            }
        }

        let run = AuditRun::new(config, ledger.clone());
        let json = serde_json::to_string_pretty(&run).context("Failed to serialize audit run")?;
        fs::write(run_dir.join("ledger.json"), json).context("Failed to write ledger.json")?;

        info!(run_dir = %run_dir.display(), phases = run.phases.len(), "audit trail written");
        Ok(run_dir)
    }

    pub fn load_run(&self, run_dir: &Path) -> Result<AuditRun> {
        let content = fs::read_to_string(run_dir.join("ledger.json"))
            .context("Failed to read audit run file")?;
        let run: AuditRun =
            serde_json::from_str(&content).context("Failed to parse audit run file")?;
        Ok(run)
    }
}

fn render_phase_output(record: &PhaseRecord) -> String {
    let status = if record.success { "completed" } else { "failed" };
    format!(
        "# Phase {}: {}\n\n- Status: {}\n- Duration: {}\n- Summary: {}\n\n---\n\n{}\n",
        record.phase,
        record.phase.display_name(),
        status,
        record.formatted_duration(),
        record.summary,
        record.detail.trim_end()
    )
}

/// Final path component of an agent-supplied file name.
fn artifact_file_name(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .find(|part| !part.is_empty() && *part != "." && *part != "..")
        .unwrap_or("artifact")
        .to_string()
}

fn unique_name(candidate: &str, used: &mut BTreeSet<String>) -> String {
    let mut name = candidate.to_string();
    let mut n = 2;
    while !used.insert(name.clone()) {
        name = format!("{}-{}", n, candidate);
        n += 1;
    }
    name
}
