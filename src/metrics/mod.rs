mod types;

pub use types::{MessageLogEntry, MetricsSnapshot};

use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::protocol::MessageKind;

const MAX_RECENT_MESSAGES: usize = 50;

/// Engine telemetry: frame and error counters plus a bounded log of recent
/// inbound messages.
pub struct TelemetryMetrics {
    inner: Arc<Mutex<MetricsState>>,
}

#[derive(Default)]
struct MetricsState {
    recent_messages: VecDeque<MessageLogEntry>,
    frames_received: u64,
    messages_by_kind: BTreeMap<String, u64>,
    parse_errors: u64,
    unrecognized_messages: u64,
    stale_frames_dropped: u64,
    reconnects_scheduled: u64,
    retries_exhausted: u64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState::default())),
        }
    }

    pub async fn record_frame(&self) {
        self.inner.lock().await.frames_received += 1;
    }

    pub async fn record_message(&self, kind: MessageKind, summary: String) {
        let mut state = self.inner.lock().await;

        *state
            .messages_by_kind
            .entry(kind.as_str().to_string())
            .or_insert(0) += 1;
        if kind == MessageKind::Unrecognized {
            state.unrecognized_messages += 1;
        }

        state.recent_messages.push_front(MessageLogEntry {
            kind: kind.as_str().to_string(),
            summary,
            received_at: Utc::now(),
        });
        state.recent_messages.truncate(MAX_RECENT_MESSAGES);
    }

    pub async fn record_parse_error(&self) {
        self.inner.lock().await.parse_errors += 1;
    }

    pub async fn record_stale_frame(&self) {
        self.inner.lock().await.stale_frames_dropped += 1;
    }

    pub async fn record_reconnect_scheduled(&self) {
        self.inner.lock().await.reconnects_scheduled += 1;
    }

    pub async fn record_retries_exhausted(&self) {
        self.inner.lock().await.retries_exhausted += 1;
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let state = self.inner.lock().await;
        MetricsSnapshot {
            frames_received: state.frames_received,
            messages_by_kind: state.messages_by_kind.clone(),
            parse_errors: state.parse_errors,
            unrecognized_messages: state.unrecognized_messages,
            stale_frames_dropped: state.stale_frames_dropped,
            reconnects_scheduled: state.reconnects_scheduled,
            retries_exhausted: state.retries_exhausted,
            recent_messages: state.recent_messages.iter().cloned().collect(),
        }
    }

    pub async fn reset(&self) {
        *self.inner.lock().await = MetricsState::default();
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for TelemetryMetrics {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
