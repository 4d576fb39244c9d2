use log::{debug, warn};
use serde::Serialize;
use std::collections::VecDeque;

use crate::alerts::{classify, session_cleared_alert, session_complete_message, SESSION_RESET_MESSAGE};
use crate::api::{DepthHistory, LastResult};
use crate::connection::ConnectionState;
use crate::error::MonitorError;
use crate::models::{Alert, DepthPoint, InferenceResult, SessionPhase, WindowMode};
use crate::protocol::{
    DepthDataMessage, InferenceMessage, MessageHandler, ModeChangeMessage, Reaction,
    SessionEventMessage,
};
use crate::stats::{RunningStatistics, StatisticsAggregator};

/// Readings kept for the depth chart.
pub const DEPTH_SERIES_CAPACITY: usize = 120;

/// Immutable view of the active session, published after every mutation.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase: SessionPhase,
    pub mode: WindowMode,
    pub buffer_len: u32,
    pub statistics: RunningStatistics,
    pub prediction: Option<InferenceResult>,
    pub alert: Alert,
    /// Oldest first.
    pub depth_series: Vec<DepthPoint>,
    pub connection: ConnectionState,
    /// `None` until the first health probe completes.
    pub healthy: Option<bool>,
    pub rpc_error: Option<String>,
}

/// Everything scoped to the single active session. Only the session
/// controller holds this, and every inbound message is applied to it in
/// arrival order.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    /// Bumped whenever the session identity changes; async completions
    /// carrying an older value are discarded.
    pub generation: u64,
    /// Bumped on every connect or disconnect; connection events carrying an
    /// older value belong to a retired worker.
    pub link_generation: u64,
    pub phase: SessionPhase,
    /// What the connection alone says the phase should be.
    pub link_phase: SessionPhase,
    pub mode: WindowMode,
    /// Bumped whenever the mode is set from a server response or push.
    pub mode_epoch: u64,
    pub buffer_len: u32,
    pub prediction: Option<InferenceResult>,
    pub alert: Alert,
    pub healthy: Option<bool>,
    pub rpc_error: Option<String>,
    aggregator: StatisticsAggregator,
    depth_series: VecDeque<DepthPoint>,
    history_seq: u64,
}

impl SessionState {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            generation: 0,
            link_generation: 0,
            phase: SessionPhase::Idle,
            link_phase: SessionPhase::Idle,
            mode: WindowMode::default(),
            mode_epoch: 0,
            buffer_len: 0,
            prediction: None,
            alert: classify(None),
            healthy: None,
            rpc_error: None,
            aggregator: StatisticsAggregator::new(),
            depth_series: VecDeque::with_capacity(DEPTH_SERIES_CAPACITY),
            history_seq: 0,
        }
    }

    pub fn statistics(&self) -> RunningStatistics {
        self.aggregator.statistics()
    }

    pub fn depth_series(&self) -> Vec<DepthPoint> {
        self.depth_series.iter().copied().collect()
    }

    /// Moves to `next` if the transition is legal; illegal requests are
    /// rejected and leave the phase untouched.
    pub fn enter(&mut self, next: SessionPhase) -> Result<(), MonitorError> {
        if !self.phase.can_transition_to(next) {
            warn!("rejected phase transition {:?} -> {:?}", self.phase, next);
            return Err(MonitorError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        if self.phase != next {
            debug!("session {} phase {:?} -> {:?}", self.session_id, self.phase, next);
        }
        self.phase = next;
        Ok(())
    }

    /// Records what the connection reports. Operation-owned phases keep
    /// their phase until [`Self::settle`] is called.
    pub fn follow_link(&mut self, link_phase: SessionPhase) {
        self.link_phase = link_phase;
        if self.phase.follows_connection() {
            let _ = self.enter(link_phase);
        }
    }

    /// Ends an operation-owned phase by adopting the connection's phase.
    pub fn settle(&mut self) {
        let target = self.link_phase;
        if self.phase == SessionPhase::SwitchingSession
            && !matches!(target, SessionPhase::Idle | SessionPhase::Connecting)
        {
            let _ = self.enter(SessionPhase::Connecting);
        }
        let _ = self.enter(target);
    }

    pub fn next_link_generation(&mut self) -> u64 {
        self.link_generation += 1;
        self.link_generation
    }

    /// Takes on a new identity and drops everything scoped to the old one.
    /// Returns the new generation.
    pub fn begin_session(&mut self, session_id: &str) -> u64 {
        self.session_id = session_id.to_string();
        self.generation += 1;
        self.clear_session_data();
        self.prediction = None;
        self.alert = classify(None);
        self.rpc_error = None;
        self.generation
    }

    /// Clears statistics, buffer length and the depth series. Any history
    /// request still in flight is invalidated.
    fn clear_session_data(&mut self) {
        self.aggregator.reset();
        self.buffer_len = 0;
        self.depth_series.clear();
        self.history_seq += 1;
    }

    fn apply_reset(&mut self, server_message: Option<&str>, default_message: &str) {
        self.clear_session_data();
        self.alert = session_cleared_alert(server_message, default_message);
    }

    /// Outcome of a caller-initiated reset that the backend confirmed.
    pub fn apply_manual_reset(&mut self) {
        self.apply_reset(None, SESSION_RESET_MESSAGE);
        self.prediction = None;
    }

    /// Issues a ticket for a history request. Only the most recent ticket may
    /// apply its response.
    pub fn begin_history_request(&mut self) -> u64 {
        self.history_seq += 1;
        self.history_seq
    }

    pub fn is_latest_history_request(&self, generation: u64, ticket: u64) -> bool {
        self.generation == generation && self.history_seq == ticket
    }

    /// Replaces the depth series and rebuilds statistics from a history
    /// response. An empty history leaves statistics as they are.
    pub fn apply_history(&mut self, history: &DepthHistory) {
        self.buffer_len = history.buffer_len;

        let skip = history.depth_data.len().saturating_sub(DEPTH_SERIES_CAPACITY);
        self.depth_series = history
            .depth_data
            .iter()
            .skip(skip)
            .map(|point| DepthPoint {
                depth_cm: point.depth,
                timestamp: point.timestamp,
            })
            .collect();

        if !history.depth_data.is_empty() {
            self.aggregator.on_bulk_load(&history.depths());
        }
    }

    /// Restores the last prediction after a (re)sync. The alert is left
    /// alone; only a live inference raises one.
    pub fn apply_last_result(&mut self, last: LastResult) {
        self.buffer_len = last.buffer_len;
        if last.result.is_some() {
            self.prediction = last.result;
        }
    }

    pub fn apply_server_mode(&mut self, mode: WindowMode) {
        self.mode = mode;
        self.mode_epoch += 1;
    }

    fn push_depth(&mut self, point: DepthPoint) {
        if self.depth_series.len() == DEPTH_SERIES_CAPACITY {
            self.depth_series.pop_front();
        }
        self.depth_series.push_back(point);
    }

    pub fn snapshot(&self, connection: ConnectionState) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            phase: self.phase,
            mode: self.mode,
            buffer_len: self.buffer_len,
            statistics: self.statistics(),
            prediction: self.prediction.clone(),
            alert: self.alert.clone(),
            depth_series: self.depth_series(),
            connection,
            healthy: self.healthy,
            rpc_error: self.rpc_error.clone(),
        }
    }
}

impl MessageHandler for SessionState {
    fn on_inference(&mut self, message: InferenceMessage) -> Reaction {
        let result = InferenceResult::from(message);
        self.alert = classify(Some(result.class_index));
        self.prediction = Some(result);
        Reaction::RefreshHistory
    }

    fn on_depth_data(&mut self, message: DepthDataMessage) -> Reaction {
        self.aggregator.on_reading(message.depth_cm);
        self.push_depth(DepthPoint {
            depth_cm: message.depth_cm,
            timestamp: message.timestamp,
        });
        self.buffer_len = message.buffer_len;
        Reaction::None
    }

    fn on_session_complete(&mut self, message: SessionEventMessage) -> Reaction {
        self.apply_reset(message.message.as_deref(), &session_complete_message());
        Reaction::None
    }

    fn on_session_reset(&mut self, message: SessionEventMessage) -> Reaction {
        self.apply_reset(message.message.as_deref(), SESSION_RESET_MESSAGE);
        Reaction::None
    }

    fn on_mode_change(&mut self, message: ModeChangeMessage) -> Reaction {
        self.apply_server_mode(message.new_mode);
        Reaction::None
    }
}
