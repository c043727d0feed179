//! Workflow engine for the seven-phase audit.
//!
//! The workflow is a small directed graph over phases: fixed edges between
//! consecutive phases, one conditional edge after the benchmark phase and a
//! single terminal phase. It is assembled and validated once, then walked
//! strictly sequentially.
//!
//! ## Architecture
//!
//! 1. **Builder** - Registers nodes and edges and validates the graph
//! 2. **Router** - Chooses the investigation or report phase after phase 5
//! 3. **Engine** - Walks the graph with a `PhaseExecutor` and owns the ledger
//!
//! ## Example
//!
//! ```no_run
//! use playbook::agent::CommandAgent;
//! use playbook::executor::PhaseExecutor;
//! use playbook::ledger::AuditParams;
//! use playbook::workflow::PlaybookRunner;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let agent = CommandAgent::new("claude", vec!["--print".to_string()]);
//! let runner = PlaybookRunner::new(PhaseExecutor::new(Arc::new(agent)));
//!
//! let params = AuditParams::new(vec!["alpha.com".to_string(), "beta.com".to_string()]);
//! let ledger = runner.execute(params).await?;
//! println!("completed: {:?}", ledger.phases_completed());
//! # Ok(())
//! # }
//! ```

mod builder;
mod engine;
mod router;

pub use builder::{Router, Transition, Workflow, WorkflowBuilder};
pub use engine::PlaybookRunner;
pub use router::route_after_benchmark;
