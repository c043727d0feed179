pub mod agent;
pub mod audit;
pub mod config;
pub mod errors;
pub mod executor;
pub mod init;
pub mod ledger;
pub mod phase;
pub mod playbook_config;
pub mod prompt;
pub mod signals;
pub mod status;
pub mod ui;
pub mod workflow;
