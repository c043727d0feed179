//! Research agent seam.
//!
//! The executor only ever talks to `ResearchAgent`. `CommandAgent` drives an
//! agent CLI over stream-json; tests substitute scripted agents.

mod command;
pub mod stream;

pub use command::CommandAgent;

use crate::ledger::AgentMessage;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// What an agent invocation produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentResponse {
    /// Ordered exchange records; the last one carries the phase output.
    pub messages: Vec<AgentMessage>,
    /// Artifact files written during the invocation.
    pub files: BTreeMap<String, String>,
}

impl AgentResponse {
    pub fn from_messages(messages: Vec<AgentMessage>) -> Self {
        Self {
            messages,
            files: BTreeMap::new(),
        }
    }

    /// Content of the last message, or `""` when there is none.
    pub fn final_text(&self) -> &str {
        self.messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// Converts a prompt into a response. Retries and timeouts belong to the implementation.
#[async_trait]
pub trait ResearchAgent: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<AgentResponse>;
}
