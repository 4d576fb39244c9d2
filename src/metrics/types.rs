use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One inbound message as shown in the diagnostics log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageLogEntry {
    pub kind: String,
    pub summary: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub messages_by_kind: BTreeMap<String, u64>,
    pub parse_errors: u64,
    pub unrecognized_messages: u64,
    pub stale_frames_dropped: u64,
    pub reconnects_scheduled: u64,
    pub retries_exhausted: u64,
    /// Newest first.
    pub recent_messages: Vec<MessageLogEntry>,
}
