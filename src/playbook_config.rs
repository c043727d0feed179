//! Configuration file support for the playbook runner.
//!
//! Settings are read from `.playbook/playbook.toml` and layered as
//! defaults → file → environment → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [agent]
//! command = "claude"
//! args = ["--print", "--output-format", "stream-json", "--verbose"]
//! skip_permissions = true
//!
//! [context]
//! max_chars_per_phase = 3000
//! summary_max_chars = 150
//!
//! [run]
//! playbook_id = "competitor-growth-engine-audit"
//! default_market = "us"
//! templates_dir = "templates"
//! embed_status_markers = true
//! event_buffer = 64
//! ```

use crate::executor::DEFAULT_CONTEXT_CHARS;
use crate::phase::DEFAULT_PLAYBOOK_ID;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the configuration inside the playbook directory.
pub const CONFIG_FILE: &str = "playbook.toml";

/// Overrides the agent command.
pub const ENV_AGENT_CMD: &str = "PLAYBOOK_AGENT_CMD";
/// `false` disables `--dangerously-skip-permissions`.
pub const ENV_SKIP_PERMISSIONS: &str = "PLAYBOOK_SKIP_PERMISSIONS";
/// Overrides the default target market.
pub const ENV_MARKET: &str = "PLAYBOOK_MARKET";

const SKIP_PERMISSIONS_FLAG: &str = "--dangerously-skip-permissions";

/// Research agent process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// Agent CLI command (default: "claude")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Arguments passed on every invocation
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,
    /// Whether to add `--dangerously-skip-permissions`
    #[serde(default = "default_skip_permissions")]
    pub skip_permissions: bool,
}

fn default_agent_args() -> Vec<String> {
    ["--print", "--output-format", "stream-json", "--verbose"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_skip_permissions() -> bool {
    true
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            command: None,
            args: default_agent_args(),
            skip_permissions: default_skip_permissions(),
        }
    }
}

/// Limits applied to earlier-phase context and summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSettings {
    /// Characters of each earlier phase's output embedded in a prompt
    #[serde(default = "default_max_chars_per_phase")]
    pub max_chars_per_phase: usize,
    /// Maximum length of a phase summary
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
}

fn default_max_chars_per_phase() -> usize {
    DEFAULT_CONTEXT_CHARS
}

fn default_summary_max_chars() -> usize {
    150
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_chars_per_phase: default_max_chars_per_phase(),
            summary_max_chars: default_summary_max_chars(),
        }
    }
}

/// Run-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSection {
    #[serde(default = "default_playbook_id")]
    pub playbook_id: String,
    /// Market used when `--market` is not given
    #[serde(default = "default_market")]
    pub default_market: String,
    /// Directory holding `<playbook_id>-phases/phase_<n>.txt`, relative to `.playbook/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,
    /// Embed `__PHASE_STATUS__` markers in the message log
    #[serde(default = "default_embed_status_markers")]
    pub embed_status_markers: bool,
    /// Capacity of the status event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_playbook_id() -> String {
    DEFAULT_PLAYBOOK_ID.to_string()
}

fn default_market() -> String {
    "us".to_string()
}

fn default_embed_status_markers() -> bool {
    true
}

fn default_event_buffer() -> usize {
    64
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            playbook_id: default_playbook_id(),
            default_market: default_market(),
            templates_dir: None,
            embed_status_markers: default_embed_status_markers(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// The complete playbook.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybookToml {
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub context: ContextSettings,
    #[serde(default)]
    pub run: RunSection,
}

impl PlaybookToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse playbook.toml")
    }

    /// Load `playbook.toml` from the playbook directory, or defaults if it is absent.
    pub fn load_or_default(playbook_dir: &Path) -> Result<Self> {
        let config_path = playbook_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize playbook.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Agent command (env → file → "claude").
    pub fn agent_cmd(&self) -> String {
        std::env::var(ENV_AGENT_CMD)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.agent.command.clone())
            .unwrap_or_else(|| "claude".to_string())
    }

    /// skip_permissions, with the environment overriding the file.
    pub fn skip_permissions(&self) -> bool {
        if let Ok(env_val) = std::env::var(ENV_SKIP_PERMISSIONS) {
            return env_val != "false";
        }
        self.agent.skip_permissions
    }

    /// Default market (env → file).
    pub fn default_market(&self) -> String {
        std::env::var(ENV_MARKET)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.run.default_market.clone())
    }

    /// Full argument list for the agent command.
    pub fn agent_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.skip_permissions() && !self.agent.args.iter().any(|a| a == SKIP_PERMISSIONS_FLAG) {
            args.push(SKIP_PERMISSIONS_FLAG.to_string());
        }
        args.extend(self.agent.args.iter().cloned());
        args
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.context.max_chars_per_phase == 0 {
            warnings.push(
                "context.max_chars_per_phase is 0: prompts will carry no earlier-phase output"
                    .to_string(),
            );
        }
        if self.context.summary_max_chars < 14 {
            warnings.push(format!(
                "context.summary_max_chars = {} is below the minimum of 14 and will be raised",
                self.context.summary_max_chars
            ));
        }
        if self.run.playbook_id.trim().is_empty() {
            warnings.push("run.playbook_id is empty".to_string());
        }
        if self.run.default_market.trim().is_empty() {
            warnings.push("run.default_market is empty: --market must be given on every run".to_string());
        }
        if self.run.event_buffer == 0 {
            warnings.push("run.event_buffer must be at least 1; 1 will be used".to_string());
        }
        if !self.agent.args.iter().any(|a| a == "stream-json") {
            warnings.push(
                "agent.args do not request stream-json output: agent output will be treated as plain text"
                    .to_string(),
            );
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Clears the playbook env vars for the duration of a test and restores them after.
    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn clear() -> Self {
            let saved = [ENV_AGENT_CMD, ENV_SKIP_PERMISSIONS, ENV_MARKET]
                .into_iter()
                .map(|key| {
                    let value = std::env::var(key).ok();
                    unsafe { std::env::remove_var(key) };
                    (key, value)
                })
                .collect();
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                match value {
                    Some(v) => unsafe { std::env::set_var(key, v) },
                    None => unsafe { std::env::remove_var(key) },
                }
            }
        }
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let toml = PlaybookToml::parse("").unwrap();
        assert_eq!(toml.context.max_chars_per_phase, 3000);
        assert_eq!(toml.context.summary_max_chars, 150);
        assert_eq!(toml.run.playbook_id, DEFAULT_PLAYBOOK_ID);
        assert_eq!(toml.run.default_market, "us");
        assert!(toml.run.embed_status_markers);
        assert_eq!(toml.run.event_buffer, 64);
        assert!(toml.agent.skip_permissions);
        assert!(toml.agent.args.contains(&"stream-json".to_string()));
    }

    #[test]
    fn test_parse_full_file() {
        let content = r#"
[agent]
command = "my-agent"
args = ["--json"]
skip_permissions = false

[context]
max_chars_per_phase = 500
summary_max_chars = 80

[run]
playbook_id = "custom"
default_market = "de"
templates_dir = "templates"
embed_status_markers = false
event_buffer = 8
"#;
        let toml = PlaybookToml::parse(content).unwrap();
        assert_eq!(toml.agent.command.as_deref(), Some("my-agent"));
        assert_eq!(toml.agent.args, vec!["--json".to_string()]);
        assert_eq!(toml.context.max_chars_per_phase, 500);
        assert_eq!(toml.run.templates_dir, Some(PathBuf::from("templates")));
        assert!(!toml.run.embed_status_markers);
    }

    #[test]
    fn test_parse_error_mentions_file() {
        let err = PlaybookToml::parse("[context\nmax = ").unwrap_err();
        assert!(err.to_string().contains("playbook.toml"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut toml = PlaybookToml::default();
        toml.run.default_market = "fr".to_string();
        toml.save(&path).unwrap();

        let loaded = PlaybookToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.run.default_market, "fr");
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempdir().unwrap();
        let toml = PlaybookToml::load_or_default(dir.path()).unwrap();
        assert_eq!(toml.run.default_market, "us");
    }

    // =========================================
    // Environment layering
    // =========================================

    #[test]
    fn test_agent_cmd_priority() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _env = EnvGuard::clear();

        assert_eq!(PlaybookToml::default().agent_cmd(), "claude");

        let toml = PlaybookToml::parse("[agent]\ncommand = \"file-agent\"\n").unwrap();
        assert_eq!(toml.agent_cmd(), "file-agent");

        unsafe { std::env::set_var(ENV_AGENT_CMD, "env-agent") };
        assert_eq!(toml.agent_cmd(), "env-agent");
    }

    #[test]
    fn test_skip_permissions_env_override() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _env = EnvGuard::clear();

        let toml = PlaybookToml::default();
        assert!(toml.agent_args().contains(&SKIP_PERMISSIONS_FLAG.to_string()));

        unsafe { std::env::set_var(ENV_SKIP_PERMISSIONS, "false") };
        assert!(!toml.skip_permissions());
        assert!(!toml.agent_args().contains(&SKIP_PERMISSIONS_FLAG.to_string()));
    }

    #[test]
    fn test_market_env_override() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _env = EnvGuard::clear();

        let toml = PlaybookToml::default();
        assert_eq!(toml.default_market(), "us");
        unsafe { std::env::set_var(ENV_MARKET, "uk") };
        assert_eq!(toml.default_market(), "uk");
    }

    #[test]
    fn test_agent_args_do_not_duplicate_skip_flag() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _env = EnvGuard::clear();

        let content = r#"
[agent]
args = ["--dangerously-skip-permissions", "--print"]
"#;
        let args = PlaybookToml::parse(content).unwrap().agent_args();
        assert_eq!(
            args.iter().filter(|a| *a == SKIP_PERMISSIONS_FLAG).count(),
            1
        );
    }

    // =========================================
    // Validation
    // =========================================

    #[test]
    fn test_validate_defaults_clean() {
        assert!(PlaybookToml::default().validate().is_empty());
    }

    #[test]
    fn test_validate_reports_bad_limits() {
        let content = r#"
[context]
max_chars_per_phase = 0
summary_max_chars = 5

[run]
event_buffer = 0
"#;
        let warnings = PlaybookToml::parse(content).unwrap().validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("max_chars_per_phase")));
        assert!(warnings.iter().any(|w| w.contains("summary_max_chars")));
        assert!(warnings.iter().any(|w| w.contains("event_buffer")));
    }

    #[test]
    fn test_validate_warns_without_stream_json() {
        let toml = PlaybookToml::parse("[agent]\nargs = [\"--print\"]\n").unwrap();
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("stream-json"));
    }
}
