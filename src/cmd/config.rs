//! Configuration view and validation commands - `playbook config`.

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use playbook::config::{Config, get_playbook_dir};
    use playbook::playbook_config::{CONFIG_FILE, PlaybookToml};

    let playbook_dir = get_playbook_dir(project_dir);
    let config_path = playbook_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Playbook Configuration");
            println!("======================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                PlaybookToml::load(&config_path)?
            } else {
                println!("No playbook.toml found at {}", config_path.display());
                println!("Using default configuration:");
                PlaybookToml::default()
            };
            println!();
            print_toml(&toml);

            // Show effective values (including env overrides)
            println!("Effective values (with env overrides):");
            let config = Config::new(project_dir.to_path_buf(), false)?;
            println!("  agent = \"{}\"", config.agent_cmd);
            println!("  agent_args = {:?}", config.agent_args);
            println!("  playbook_id = \"{}\"", config.playbook_id());
            println!("  market = \"{}\"", config.default_market());
            match config.templates_dir() {
                Some(dir) => println!("  templates = {}", dir.display()),
                None => println!("  templates = built-in"),
            }
            println!();

            if !config_path.exists() {
                println!("Run 'playbook config init' to create a playbook.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No playbook.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = PlaybookToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("playbook.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !playbook_dir.exists() {
                std::fs::create_dir_all(&playbook_dir)?;
            }

            PlaybookToml::default().save(&config_path)?;

            println!("Created playbook.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [agent] command, args, skip_permissions");
            println!("  - [context] max_chars_per_phase, summary_max_chars");
            println!("  - [run] playbook_id, default_market, templates_dir");
            println!();
        }
    }

    Ok(())
}

fn print_toml(toml: &playbook::playbook_config::PlaybookToml) {
    println!("[agent]");
    if let Some(cmd) = &toml.agent.command {
        println!("  command = \"{}\"", cmd);
    }
    println!("  args = {:?}", toml.agent.args);
    println!("  skip_permissions = {}", toml.agent.skip_permissions);
    println!();

    println!("[context]");
    println!("  max_chars_per_phase = {}", toml.context.max_chars_per_phase);
    println!("  summary_max_chars = {}", toml.context.summary_max_chars);
    println!();

    println!("[run]");
    println!("  playbook_id = \"{}\"", toml.run.playbook_id);
    println!("  default_market = \"{}\"", toml.run.default_market);
    if let Some(dir) = &toml.run.templates_dir {
        println!("  templates_dir = \"{}\"", dir.display());
    }
    println!("  embed_status_markers = {}", toml.run.embed_status_markers);
    println!("  event_buffer = {}", toml.run.event_buffer);
    println!();
}
