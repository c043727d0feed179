//! Phase status reporting.
//!
//! Every phase transition becomes a `StatusEvent` that is:
//! - embedded in the ledger's message log as a `__PHASE_STATUS__` marker
//! - sent on the optional event channel for live consumers
//! - mirrored into the ledger's todo list under the phase's stable todo id
//!
//! The todo list doubles as the per-phase status state, so an event that
//! would break the `started -> progress* -> completed|error` order is dropped.

use crate::ledger::{AgentMessage, Ledger, TodoStatus};
use crate::signals::{PhaseStatus, StatusEvent, encode_status_marker};
use tokio::sync::mpsc;
use tracing::warn;

pub struct StatusReporter {
    sender: Option<mpsc::Sender<StatusEvent>>,
    embed_markers: bool,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    pub fn new() -> Self {
        Self {
            sender: None,
            embed_markers: true,
        }
    }

    /// Also deliver every accepted event on `sender`.
    pub fn with_event_channel(mut self, sender: mpsc::Sender<StatusEvent>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Toggle embedding of status markers in the message log.
    pub fn with_markers(mut self, embed: bool) -> Self {
        self.embed_markers = embed;
        self
    }

    /// Report a transition. Returns `false` if the event was dropped as out of order.
    pub async fn report(&self, ledger: &mut Ledger, event: StatusEvent) -> bool {
        let todo_id = event.phase.todo_id();
        let current = ledger.todo(&todo_id).map(|t| t.status);

        let legal = match (event.status, current) {
            (PhaseStatus::Started, None) => true,
            (PhaseStatus::Started, Some(_)) => false,
            (_, Some(TodoStatus::InProgress)) => true,
            (_, _) => false,
        };
        if !legal {
            warn!(
                phase = event.phase.number(),
                status = %event.status,
                previous = ?current,
                "dropping out-of-order phase status"
            );
            return false;
        }

        if self.embed_markers {
            match encode_status_marker(&event) {
                Ok(marker) => {
                    ledger.append_messages(std::iter::once(AgentMessage::assistant(marker)));
                }
                Err(e) => warn!(error = %e, "failed to encode status marker"),
            }
        }

        ledger.upsert_todo(
            &todo_id,
            event.phase.display_name(),
            event.status.todo_status(),
        );

        if let Some(ref sender) = self.sender {
            // A closed receiver only means nobody is watching.
            sender.send(event).await.ok();
        }

        true
    }
}
