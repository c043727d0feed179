//! Status marker encoding and extraction.
//!
//! Status events travel inside the free-text message log wrapped as
//! `__PHASE_STATUS__{json}__`, so a consumer reading the raw stream can pick
//! them out without a side channel.

use super::types::StatusEvent;
use regex::Regex;
use std::sync::LazyLock;

pub const STATUS_MARKER_PREFIX: &str = "__PHASE_STATUS__";
pub const STATUS_MARKER_SUFFIX: &str = "__";

static STATUS_MARKER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)__PHASE_STATUS__(\{.*?\})__").unwrap());

/// Wrap an event in the status marker.
///
/// Compact JSON only produces `}_` inside string values, so it is escaped
/// there to keep the closing `}__` unique.
pub fn encode_status_marker(event: &StatusEvent) -> serde_json::Result<String> {
    let json = serde_json::to_string(event)?.replace("}_", "}\\u005f");
    Ok(format!(
        "{}{}{}",
        STATUS_MARKER_PREFIX, json, STATUS_MARKER_SUFFIX
    ))
}

/// Recover every well-formed status event embedded in `text`, in order.
///
/// Markers whose payload is not a valid event are skipped.
pub fn extract_status_events(text: &str) -> Vec<StatusEvent> {
    STATUS_MARKER_REGEX
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .filter_map(|m| serde_json::from_str::<StatusEvent>(m.as_str()).ok())
        .collect()
}
