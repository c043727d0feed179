use crate::ledger::Ledger;
use crate::phase::PhaseId;
use tracing::info;

/// Pick the phase that follows the benchmark phase.
///
/// The investigation phase runs only when the historical-trends phase
/// succeeded and flagged fluctuations. A missing or failed phase 2 never
/// triggers it.
pub fn route_after_benchmark(ledger: &Ledger) -> PhaseId {
    let flagged = ledger.routing_flag();
    let target = if flagged {
        PhaseId::INVESTIGATION
    } else {
        PhaseId::REPORT
    };
    info!(
        requires_investigation = flagged,
        next_phase = target.number(),
        "routing after benchmark phase"
    );
    target
}
