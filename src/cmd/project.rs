//! Project initialization - `playbook init`.

use anyhow::Result;
use std::path::Path;

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    use playbook::init::{init_project, is_initialized};

    let was_initialized = is_initialized(project_dir);
    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "Initialized playbook project at {}",
            result.playbook_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .playbook/");
        println!("  ├── playbook.toml   # Agent, context and run settings");
        println!("  ├── runs/           # Audit trail");
        println!("  ├── logs/           # playbook.log");
        println!("  └── templates/      # Editable phase prompts");
        println!();
        println!("Next steps:");
        println!("  1. Review .playbook/playbook.toml (`playbook config show`)");
        println!("  2. Preview a prompt with `playbook render --phase 1 --competitor example.com`");
        println!("  3. Run `playbook run --competitor example.com` to start the audit");
    } else if was_initialized {
        println!(
            "Playbook project already initialized at {}",
            result.playbook_dir.display()
        );
        if result.templates_written > 0 {
            println!("Restored {} missing phase template(s).", result.templates_written);
        }
        println!("Directory structure verified.");
    }

    Ok(())
}
