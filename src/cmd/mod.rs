//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled        |
//! |------------|-------------------------|
//! | `run`      | `Run`                   |
//! | `phases`   | `Phases`, `Render`      |
//! | `project`  | `Init`                  |
//! | `config`   | `Config`                |

pub mod config;
pub mod phases;
pub mod project;
pub mod run;

pub use config::cmd_config;
pub use phases::{cmd_phases, cmd_render};
pub use project::cmd_init;
pub use run::{RunArgs, cmd_run};
