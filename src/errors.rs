//! Typed error hierarchy for the playbook runner.
//!
//! Four enums cover the four failure domains:
//! - `LedgerError` - run-state invariant violations
//! - `PhaseError` - per-phase execution failures, contained at the phase boundary
//! - `WorkflowError` - graph assembly, run-entry and bookkeeping failures, fatal to the caller
//! - `AgentError` - failures of the process-backed research agent

use crate::phase::PhaseId;
use thiserror::Error;

/// Violations of the run ledger's invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Result for phase {phase} is already recorded")]
    ResultAlreadySet { phase: PhaseId },

    #[error("Phase {phase} was already attempted")]
    DuplicateAttempt { phase: PhaseId },

    #[error("Cannot advance from phase {from} to phase {to}")]
    InvalidTransition { from: PhaseId, to: PhaseId },

    #[error("Phase {phase} cannot carry {kind} details")]
    DetailsMismatch { phase: PhaseId, kind: &'static str },
}

/// Errors from a single phase execution.
///
/// These never reach the caller of a run: the executor converts them into a
/// failed phase record and an entry in the ledger's error list.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("Prompt rendering failed: {0:#}")]
    Render(anyhow::Error),

    #[error("Research agent failed: {0:#}")]
    Agent(anyhow::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Fatal errors raised by the workflow engine before or instead of a run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Workflow has no entry point")]
    MissingEntryPoint,

    #[error("Workflow entry point must be phase 1, got phase {0}")]
    InvalidEntryPoint(PhaseId),

    #[error("Edge references unregistered phase {0}")]
    UnknownNode(PhaseId),

    #[error("Phase {0} registered twice")]
    DuplicateNode(PhaseId),

    #[error("Phase {0} declares more than one outgoing edge")]
    DuplicateEdge(PhaseId),

    #[error("Phase {0} has no outgoing edge")]
    MissingOutgoingEdge(PhaseId),

    #[error("Conditional edge from phase {from} must declare at least two distinct targets")]
    InvalidConditionalEdge { from: PhaseId },

    #[error("Phase {from} cannot declare edge {edge}")]
    UnexpectedEdge { from: PhaseId, edge: String },

    #[error("Workflow must have exactly one terminal phase, found {0}")]
    TerminalCount(usize),

    #[error("Phase {0} is unreachable from the entry point")]
    Unreachable(PhaseId),

    #[error("Workflow contains a cycle involving phases: {0:?}")]
    Cycle(Vec<PhaseId>),

    #[error("Router at phase {from} chose undeclared target phase {to}")]
    UndeclaredRoute { from: PhaseId, to: PhaseId },

    #[error("Invalid audit parameters: {0}")]
    InvalidParams(String),

    #[error("Run bookkeeping failed: {0}")]
    Ledger(#[from] LedgerError),
}

/// Errors from the process-backed research agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to spawn agent command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Agent exited with non-zero code {exit_code}")]
    NonZeroExit { exit_code: i32 },

    #[error("Agent reported an error: {0}")]
    Reported(String),
}
