use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{MonitorApi, ResetConfirmation};
use crate::connection::{
    ConnectionEvent, ConnectionEventKind, ConnectionManager, ConnectionState, Transport,
};
use crate::error::MonitorError;
use crate::metrics::{MetricsSnapshot, TelemetryMetrics};
use crate::models::{SessionPhase, WindowMode};
use crate::protocol::{dispatch, parse_frame, Dispatched, MessageKind, Reaction};
use crate::settings::MonitorSettings;

use super::health::health_loop;
use super::state::{SessionSnapshot, SessionState};

// Set to false to silence per-frame dispatch logging
const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "cpr_monitor::session";

use crate::{log_debug, log_error, log_info, log_warn};

type EventReceiver = mpsc::UnboundedReceiver<ConnectionEvent>;

struct BackgroundTasks {
    cancel_token: CancellationToken,
    /// Hands the event receiver back on exit so the controller can restart.
    dispatch: JoinHandle<EventReceiver>,
    health: JoinHandle<()>,
}

enum FrameOutcome {
    Dispatched(Dispatched),
    ParseError,
}

/// Owns the single active session: its identity, windowing mode, derived
/// state and the wiring between the connection and everything that consumes
/// its frames. Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    connection: Arc<Mutex<ConnectionManager>>,
    link: Arc<Mutex<ConnectionState>>,
    api: Arc<dyn MonitorApi>,
    metrics: TelemetryMetrics,
    snapshots: Arc<watch::Sender<SessionSnapshot>>,
    settings: Arc<MonitorSettings>,
    events: Arc<Mutex<Option<EventReceiver>>>,
    background: Arc<Mutex<Option<BackgroundTasks>>>,
}

impl SessionController {
    pub fn new(
        settings: MonitorSettings,
        transport: Arc<dyn Transport>,
        api: Arc<dyn MonitorApi>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(transport, settings.reconnect, events_tx);
        let link = manager.state_handle();

        let state = SessionState::new(&settings.session_id);
        let (snapshots, _) = watch::channel(state.snapshot(ConnectionState::default()));

        Self {
            state: Arc::new(Mutex::new(state)),
            connection: Arc::new(Mutex::new(manager)),
            link,
            api,
            metrics: TelemetryMetrics::new(),
            snapshots: Arc::new(snapshots),
            settings: Arc::new(settings),
            events: Arc::new(Mutex::new(Some(events_rx))),
            background: Arc::new(Mutex::new(None)),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub async fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.get_snapshot().await
    }

    /// Starts the dispatcher and health probe, then activates the configured
    /// session.
    pub async fn start(&self) -> Result<(), MonitorError> {
        self.spawn_background().await;
        let session_id = self.state.lock().await.session_id.clone();
        self.set_session_id(&session_id).await
    }

    /// Replaces the session identity: the old stream is closed, all
    /// session-scoped state is cleared, and the new session is connected and
    /// synchronised. Completions still in flight for the old identity are
    /// discarded when they land.
    pub async fn set_session_id(&self, session_id: &str) -> Result<(), MonitorError> {
        let generation = {
            let mut state = self.state.lock().await;
            state.enter(SessionPhase::SwitchingSession)?;
            state.next_link_generation();
            state.link_phase = SessionPhase::Idle;
            let generation = state.begin_session(session_id);
            log_info!("switching to session {} (generation {})", session_id, generation);
            generation
        };
        self.metrics.reset().await;
        self.publish().await;

        self.connection.lock().await.disconnect().await;

        let delay = Duration::from_millis(self.settings.initial_connect_delay_ms);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut connection = self.connection.lock().await;
        let link_generation = {
            let mut state = self.state.lock().await;
            if state.generation != generation {
                log_debug!("switch to {} superseded before connecting", session_id);
                return Ok(());
            }
            state.link_phase = SessionPhase::Connecting;
            state.settle();
            state.next_link_generation()
        };
        connection.connect(session_id, link_generation).await;
        drop(connection);

        self.publish().await;
        self.spawn_initial_sync(generation);
        Ok(())
    }

    /// Manual reset through the backend. Local state is cleared only once the
    /// backend confirms; a failure leaves it untouched.
    pub async fn reset(&self) -> Result<ResetConfirmation, MonitorError> {
        let (session_id, generation) = {
            let mut state = self.state.lock().await;
            state.enter(SessionPhase::Resetting)?;
            (state.session_id.clone(), state.generation)
        };
        self.publish().await;

        let result = self.api.reset_session(&session_id).await;

        {
            let mut state = self.state.lock().await;
            if state.generation == generation {
                match &result {
                    Ok(confirmation) => {
                        log_info!(
                            "session {} reset ({} compressions discarded)",
                            session_id,
                            confirmation.total_compressions_before_reset
                        );
                        state.apply_manual_reset();
                        state.rpc_error = None;
                    }
                    Err(err) => {
                        log_warn!("reset of session {} failed: {}", session_id, err);
                        state.rpc_error = Some(err.to_string());
                    }
                }
            }
            state.settle();
        }
        self.publish().await;
        result
    }

    /// Requests the opposite windowing mode.
    pub async fn toggle_mode(&self) -> Result<WindowMode, MonitorError> {
        let target = self.state.lock().await.mode.toggled();
        self.set_mode(target).await
    }

    /// Requests `mode` from the backend and returns the mode in effect
    /// afterwards. A `mode_change` pushed by the server while the request was
    /// in flight takes precedence over the response.
    pub async fn set_mode(&self, mode: WindowMode) -> Result<WindowMode, MonitorError> {
        let (session_id, generation, epoch) = {
            let state = self.state.lock().await;
            (state.session_id.clone(), state.generation, state.mode_epoch)
        };

        let result = self.api.set_mode(&session_id, mode).await;

        let outcome = {
            let mut state = self.state.lock().await;
            if state.generation != generation {
                return result.map(|update| update.new_mode);
            }
            match result {
                Ok(update) => {
                    state.rpc_error = None;
                    if state.mode_epoch == epoch {
                        state.apply_server_mode(update.new_mode);
                    } else {
                        log_debug!(
                            "server changed mode while {} was pending, keeping {}",
                            update.new_mode,
                            state.mode
                        );
                    }
                    Ok(state.mode)
                }
                Err(err) => {
                    state.rpc_error = Some(err.to_string());
                    Err(err)
                }
            }
        };
        self.publish().await;
        outcome
    }

    /// Starts a fresh connection chain for the current session, typically
    /// after retries were exhausted. A no-op while a connection is active.
    pub async fn reconnect(&self) -> Result<(), MonitorError> {
        let mut connection = self.connection.lock().await;
        let (session_id, link_generation) = {
            let mut state = self.state.lock().await;
            if state.phase == SessionPhase::SwitchingSession {
                return Err(MonitorError::InvalidTransition {
                    from: state.phase,
                    to: SessionPhase::Connecting,
                });
            }
            if connection.is_active() {
                return Ok(());
            }
            state.link_phase = SessionPhase::Connecting;
            if state.phase.follows_connection() || state.phase == SessionPhase::Idle {
                state.enter(SessionPhase::Connecting)?;
            }
            (state.session_id.clone(), state.next_link_generation())
        };
        connection.connect(&session_id, link_generation).await;
        drop(connection);

        self.publish().await;
        Ok(())
    }

    /// Closes the stream and cancels any pending reconnect. Session state is
    /// kept.
    pub async fn disconnect(&self) {
        let mut connection = self.connection.lock().await;
        {
            let mut state = self.state.lock().await;
            state.next_link_generation();
            state.follow_link(SessionPhase::Idle);
        }
        connection.disconnect().await;
        drop(connection);
        self.publish().await;
    }

    /// Stops the background tasks and the connection.
    pub async fn shutdown(&self) {
        if let Some(tasks) = self.background.lock().await.take() {
            tasks.cancel_token.cancel();
            match tasks.dispatch.await {
                Ok(events) => *self.events.lock().await = Some(events),
                Err(err) => log_error!("dispatch task failed to join: {}", err),
            }
            if let Err(err) = tasks.health.await {
                log_error!("health task failed to join: {}", err);
            }
        }
        self.disconnect().await;
        log_info!("session controller stopped");
    }

    /// Probes backend health and records the outcome.
    pub async fn check_health(&self) -> bool {
        let result = self.api.health().await;
        let healthy = {
            let mut state = self.state.lock().await;
            let healthy = match result {
                Ok(status) => {
                    state.rpc_error = None;
                    status.is_ok()
                }
                Err(err) => {
                    log_warn!("health check failed: {}", err);
                    state.rpc_error = Some(err.to_string());
                    false
                }
            };
            state.healthy = Some(healthy);
            healthy
        };
        self.publish().await;
        healthy
    }

    async fn spawn_background(&self) {
        let mut background = self.background.lock().await;
        if background.is_some() {
            return;
        }
        let Some(events) = self.events.lock().await.take() else {
            log_error!("event receiver missing, dispatcher not started");
            return;
        };

        let cancel_token = CancellationToken::new();
        let dispatch = tokio::spawn(self.clone().dispatch_loop(events, cancel_token.clone()));
        let period = Duration::from_secs(self.settings.health_interval_secs.max(1));
        let health = tokio::spawn(health_loop(self.clone(), period, cancel_token.clone()));

        *background = Some(BackgroundTasks {
            cancel_token,
            dispatch,
            health,
        });
    }

    /// Single consumer of connection events, so frames are applied strictly
    /// in arrival order.
    async fn dispatch_loop(self, mut events: EventReceiver, cancel_token: CancellationToken) -> EventReceiver {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                }
            }
        }
        events
    }

    async fn handle_event(&self, event: ConnectionEvent) {
        let kind = event.kind;
        let reconnect_scheduled = matches!(kind, ConnectionEventKind::ReconnectScheduled { .. });
        let retries_exhausted = kind == ConnectionEventKind::RetriesExhausted;

        let mut outcome = None;
        let mut refresh = None;
        {
            let mut state = self.state.lock().await;
            if event.generation != state.link_generation {
                drop(state);
                if matches!(kind, ConnectionEventKind::Frame(_)) {
                    self.metrics.record_stale_frame().await;
                }
                log_debug!("dropping event from retired link {}", event.generation);
                return;
            }

            match kind {
                ConnectionEventKind::Opened => state.follow_link(SessionPhase::Live),
                ConnectionEventKind::Closed { .. } => state.follow_link(SessionPhase::Connecting),
                ConnectionEventKind::ReconnectScheduled { .. } => {}
                ConnectionEventKind::RetriesExhausted => state.follow_link(SessionPhase::Offline),
                ConnectionEventKind::Frame(text) => match parse_frame(&text) {
                    Ok(message) => {
                        let dispatched = dispatch(message, &mut *state);
                        if dispatched.reaction == Reaction::RefreshHistory {
                            refresh = Some(state.generation);
                        }
                        outcome = Some(FrameOutcome::Dispatched(dispatched));
                    }
                    Err(err) => {
                        log_warn!("dropping malformed frame: {}", err);
                        outcome = Some(FrameOutcome::ParseError);
                    }
                },
            }
        }

        match outcome {
            Some(FrameOutcome::Dispatched(dispatched)) => {
                self.metrics.record_frame().await;
                if dispatched.kind == MessageKind::Unrecognized {
                    log_debug!("ignoring message of unrecognized type");
                }
                self.metrics
                    .record_message(dispatched.kind, dispatched.summary)
                    .await;
            }
            Some(FrameOutcome::ParseError) => {
                self.metrics.record_frame().await;
                self.metrics.record_parse_error().await;
            }
            None => {}
        }
        if reconnect_scheduled {
            self.metrics.record_reconnect_scheduled().await;
        }
        if retries_exhausted {
            self.metrics.record_retries_exhausted().await;
        }

        self.publish().await;

        if let Some(generation) = refresh {
            let controller = self.clone();
            tokio::spawn(async move { controller.refresh_history(generation).await });
        }
    }

    fn spawn_initial_sync(&self, generation: u64) {
        let controller = self.clone();
        tokio::spawn(async move {
            tokio::join!(
                controller.refresh_history(generation),
                controller.sync_last_result(generation),
                controller.sync_mode(generation),
            );
        });
    }

    /// Re-reads the depth history. Applied only if the session is unchanged
    /// and no newer history request was issued meanwhile.
    async fn refresh_history(&self, generation: u64) {
        let (session_id, ticket) = {
            let mut state = self.state.lock().await;
            if state.generation != generation {
                return;
            }
            (state.session_id.clone(), state.begin_history_request())
        };

        let result = self
            .api
            .fetch_history(&session_id, self.settings.history_limit)
            .await;

        {
            let mut state = self.state.lock().await;
            if !state.is_latest_history_request(generation, ticket) {
                log_debug!("discarding superseded history for session {}", session_id);
                return;
            }
            match result {
                Ok(history) => {
                    state.apply_history(&history);
                    state.rpc_error = None;
                }
                Err(err) => {
                    log_warn!("history fetch for session {} failed: {}", session_id, err);
                    state.rpc_error = Some(err.to_string());
                }
            }
        }
        self.publish().await;
    }

    async fn sync_last_result(&self, generation: u64) {
        let session_id = self.state.lock().await.session_id.clone();
        let result = self.api.last_result(&session_id).await;

        {
            let mut state = self.state.lock().await;
            if state.generation != generation {
                return;
            }
            match result {
                Ok(last) => {
                    state.apply_last_result(last);
                    state.rpc_error = None;
                }
                Err(err) => state.rpc_error = Some(err.to_string()),
            }
        }
        self.publish().await;
    }

    async fn sync_mode(&self, generation: u64) {
        let (session_id, epoch) = {
            let state = self.state.lock().await;
            (state.session_id.clone(), state.mode_epoch)
        };
        let result = self.api.get_mode(&session_id).await;

        {
            let mut state = self.state.lock().await;
            if state.generation != generation {
                return;
            }
            match result {
                Ok(status) => {
                    if state.mode_epoch == epoch {
                        state.apply_server_mode(status.mode);
                    }
                    state.rpc_error = None;
                }
                Err(err) => state.rpc_error = Some(err.to_string()),
            }
        }
        self.publish().await;
    }

    async fn publish(&self) {
        let snapshot = {
            let state = self.state.lock().await;
            let link = self.link.lock().await.clone();
            state.snapshot(link)
        };
        self.snapshots.send_replace(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{session_complete_message, SESSION_RESET_MESSAGE};
    use crate::models::{AlertSeverity, InferenceResult};
    use crate::stats::RunningStatistics;
    use crate::testing::{FakeApi, ScriptedTransport};
    use serde_json::json;

    fn settings(session_id: &str) -> MonitorSettings {
        MonitorSettings {
            session_id: session_id.into(),
            ..MonitorSettings::default()
        }
    }

    fn controller(
        session_id: &str,
        transport: &Arc<ScriptedTransport>,
        api: &Arc<FakeApi>,
    ) -> SessionController {
        SessionController::new(settings(session_id), transport.clone(), api.clone())
    }

    async fn wait_for(
        controller: &SessionController,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        let mut rx = controller.subscribe();
        tokio::time::timeout(Duration::from_secs(120), async move {
            rx.wait_for(predicate).await.map(|snapshot| snapshot.clone())
        })
        .await
        .expect("timed out waiting for snapshot")
        .expect("snapshot channel closed")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    fn depth(depth_cm: f64, buffer_len: u32) -> serde_json::Value {
        json!({
            "type": "depth_data",
            "depth_cm": depth_cm,
            "timestamp": 1700000000.5,
            "buffer_len": buffer_len,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn session_complete_clears_statistics_and_raises_success() {
        let transport = Arc::new(ScriptedTransport::new());
        let feed = transport.accept_next();
        let api = Arc::new(FakeApi::new());
        let controller = controller("s1", &transport, &api);

        controller.start().await.unwrap();
        wait_for(&controller, |s| s.phase == SessionPhase::Live).await;
        settle().await;

        for (i, reading) in [3.0, 5.0, 6.0, 7.0].iter().enumerate() {
            feed.send_json(&depth(*reading, i as u32 + 1));
        }
        let live = wait_for(&controller, |s| s.statistics.total_compressions == 4).await;
        assert_eq!(live.buffer_len, 4);
        assert!((live.statistics.average_depth - 5.25).abs() < 1e-9);
        assert_eq!(live.depth_series.len(), 4);

        feed.send_json(&json!({
            "type": "session_complete",
            "total_compressions": 120,
        }));
        let cleared = wait_for(&controller, |s| s.statistics.total_compressions == 0).await;

        assert_eq!(cleared.statistics, RunningStatistics::default());
        assert_eq!(cleared.buffer_len, 0);
        assert!(cleared.depth_series.is_empty());
        assert_eq!(cleared.alert.severity, AlertSeverity::Success);
        assert_eq!(cleared.alert.message, session_complete_message());
        assert_eq!(cleared.phase, SessionPhase::Live);
    }

    #[tokio::test(start_paused = true)]
    async fn late_history_for_previous_session_is_discarded() {
        let transport = Arc::new(ScriptedTransport::new());
        let _a = transport.accept_next();
        let _b = transport.accept_next();
        let api = Arc::new(FakeApi::new());
        api.set_history("a", &[3.0, 4.0]);
        api.set_history_latency("a", Duration::from_secs(5));
        api.set_history("b", &[7.0, 7.0, 7.0]);
        let controller = controller("a", &transport, &api);

        controller.start().await.unwrap();
        controller.set_session_id("b").await.unwrap();

        wait_for(&controller, |s| {
            s.session_id == "b" && s.statistics.total_compressions == 3
        })
        .await;

        tokio::time::sleep(Duration::from_secs(10)).await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.session_id, "b");
        assert_eq!(snapshot.statistics.total_compressions, 3);
        assert!((snapshot.statistics.average_depth - 7.0).abs() < 1e-9);
        assert_eq!(api.call_count("history:a"), 1);
        assert_eq!(transport.opened_sessions(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(transport.live_streams(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_reset_clears_state_after_confirmation() {
        let transport = Arc::new(ScriptedTransport::new());
        let _feed = transport.accept_next();
        let api = Arc::new(FakeApi::new());
        api.set_history("s1", &[4.0, 5.5, 6.5]);
        api.set_last_result(
            "s1",
            InferenceResult {
                class_index: 0,
                class_label: "stabil".into(),
                probs: vec![0.9, 0.05, 0.03, 0.02],
            },
        );
        let controller = controller("s1", &transport, &api);

        controller.start().await.unwrap();
        let synced = wait_for(&controller, |s| {
            s.phase == SessionPhase::Live
                && s.statistics.total_compressions == 3
                && s.prediction.is_some()
        })
        .await;
        // A restored prediction does not raise an alert by itself.
        assert_eq!(synced.alert.severity, AlertSeverity::Warning);

        let confirmation = controller.reset().await.unwrap();
        assert_eq!(confirmation.total_compressions_before_reset, 3);

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.statistics, RunningStatistics::default());
        assert_eq!(snapshot.prediction, None);
        assert_eq!(snapshot.alert.severity, AlertSeverity::Success);
        assert_eq!(snapshot.alert.message, SESSION_RESET_MESSAGE);
        assert_eq!(snapshot.phase, SessionPhase::Live);
        assert_eq!(api.call_count("reset:s1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reset_leaves_state_untouched() {
        let transport = Arc::new(ScriptedTransport::new());
        let _feed = transport.accept_next();
        let api = Arc::new(FakeApi::new());
        api.set_history("s1", &[4.0, 5.5, 6.5]);
        api.fail("reset", "backend down");
        let controller = controller("s1", &transport, &api);

        controller.start().await.unwrap();
        wait_for(&controller, |s| {
            s.phase == SessionPhase::Live && s.statistics.total_compressions == 3
        })
        .await;

        let err = controller.reset().await.unwrap_err();
        assert_eq!(err, MonitorError::rpc("Reset session", "backend down"));

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.statistics.total_compressions, 3);
        assert_eq!(snapshot.rpc_error.as_deref(), Some("Reset session failed: backend down"));
        assert_eq!(snapshot.phase, SessionPhase::Live);
        assert!(snapshot.connection.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_calls_clear_previous_rpc_error() {
        let transport = Arc::new(ScriptedTransport::new());
        let _feed = transport.accept_next();
        let api = Arc::new(FakeApi::new());
        api.set_history("s1", &[4.0, 5.5, 6.5]);
        api.fail("reset", "backend down");
        let controller = controller("s1", &transport, &api);

        controller.start().await.unwrap();
        wait_for(&controller, |s| {
            s.phase == SessionPhase::Live && s.statistics.total_compressions == 3
        })
        .await;

        controller.reset().await.unwrap_err();
        assert!(controller.snapshot().rpc_error.is_some());

        api.clear_failure("reset");
        controller.reset().await.unwrap();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.rpc_error, None);
        assert_eq!(snapshot.statistics.total_compressions, 0);

        api.fail("health", "timed out");
        assert!(!controller.check_health().await);
        assert_eq!(
            controller.snapshot().rpc_error.as_deref(),
            Some("Health check failed: timed out")
        );

        api.clear_failure("health");
        assert!(controller.check_health().await);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.rpc_error, None);
        assert_eq!(snapshot.healthy, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn server_mode_change_wins_over_pending_toggle() {
        let transport = Arc::new(ScriptedTransport::new());
        let feed = transport.accept_next();
        let api = Arc::new(FakeApi::new());
        let controller = controller("s1", &transport, &api);

        controller.start().await.unwrap();
        wait_for(&controller, |s| s.phase == SessionPhase::Live).await;
        settle().await;
        assert_eq!(controller.snapshot().mode, WindowMode::NonOverlap);

        api.set_mode_latency(Duration::from_secs(2));
        let toggling = tokio::spawn({
            let controller = controller.clone();
            async move { controller.toggle_mode().await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;

        feed.send_json(&json!({
            "type": "mode_change",
            "old_mode": "sliding",
            "new_mode": "nonoverlap",
            "message": "Mode reverted by operator",
        }));

        let mode = toggling.await.unwrap().unwrap();
        assert_eq!(mode, WindowMode::NonOverlap);
        assert_eq!(controller.snapshot().mode, WindowMode::NonOverlap);
        assert_eq!(api.call_count("set_mode:s1:sliding"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_applies_confirmed_mode() {
        let transport = Arc::new(ScriptedTransport::new());
        let _feed = transport.accept_next();
        let api = Arc::new(FakeApi::new());
        let controller = controller("s1", &transport, &api);

        controller.start().await.unwrap();
        settle().await;

        assert_eq!(controller.toggle_mode().await.unwrap(), WindowMode::Sliding);
        assert_eq!(controller.snapshot().mode, WindowMode::Sliding);

        api.fail("set_mode", "Internal Server Error");
        assert!(controller.set_mode(WindowMode::NonOverlap).await.is_err());
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.mode, WindowMode::Sliding);
        assert_eq!(
            snapshot.rpc_error.as_deref(),
            Some("Update mode failed: Internal Server Error")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn inference_replaces_alert_and_refreshes_history() {
        let transport = Arc::new(ScriptedTransport::new());
        let feed = transport.accept_next();
        let api = Arc::new(FakeApi::new());
        api.set_history("s1", &[5.5]);
        let controller = controller("s1", &transport, &api);

        controller.start().await.unwrap();
        wait_for(&controller, |s| {
            s.phase == SessionPhase::Live && s.statistics.total_compressions == 1
        })
        .await;
        settle().await;
        let fetched = api.call_count("history:s1");

        api.set_history("s1", &[5.5, 4.0]);
        feed.send_json(&json!({
            "type": "inference",
            "class_index": 2,
            "class_label": "cenderung atas",
            "probs": [0.1, 0.1, 0.7, 0.1],
        }));

        let snapshot = wait_for(&controller, |s| s.statistics.total_compressions == 2).await;
        assert_eq!(snapshot.prediction.map(|p| p.class_index), Some(2));
        assert_eq!(snapshot.alert.severity, AlertSeverity::Warning);
        assert_eq!(snapshot.statistics.percentage_shallow, 50.0);
        assert_eq!(api.call_count("history:s1"), fetched + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_and_unknown_frames_are_not_fatal() {
        let transport = Arc::new(ScriptedTransport::new());
        let feed = transport.accept_next();
        let api = Arc::new(FakeApi::new());
        let controller = controller("s1", &transport, &api);

        controller.start().await.unwrap();
        wait_for(&controller, |s| s.phase == SessionPhase::Live).await;
        settle().await;

        feed.send_text("not json");
        feed.send_text(r#"{"type":"depth_data"}"#);
        feed.send_text(r#"{"type":"heartbeat","seq":1}"#);
        feed.send_json(&depth(5.5, 1));

        let snapshot = wait_for(&controller, |s| s.statistics.total_compressions == 1).await;
        assert!(snapshot.connection.connected);
        assert_eq!(snapshot.phase, SessionPhase::Live);

        let metrics = controller.metrics_snapshot().await;
        assert_eq!(metrics.frames_received, 4);
        assert_eq!(metrics.parse_errors, 2);
        assert_eq!(metrics.unrecognized_messages, 1);
        assert_eq!(metrics.recent_messages[0].kind, "depth_data");
    }

    #[tokio::test(start_paused = true)]
    async fn network_blip_keeps_accumulated_statistics() {
        let transport = Arc::new(ScriptedTransport::new());
        let first = transport.accept_next();
        let _second = transport.accept_next();
        let api = Arc::new(FakeApi::new());
        let controller = controller("s1", &transport, &api);

        controller.start().await.unwrap();
        wait_for(&controller, |s| s.phase == SessionPhase::Live).await;
        settle().await;

        first.send_json(&depth(4.0, 1));
        first.send_json(&depth(6.5, 2));
        wait_for(&controller, |s| s.statistics.total_compressions == 2).await;

        first.fail("connection reset");
        tokio::time::sleep(Duration::from_secs(5)).await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Live);
        assert_eq!(snapshot.statistics.total_compressions, 2);
        assert_eq!(transport.open_count(), 2);
        assert_eq!(controller.metrics_snapshot().await.reconnects_scheduled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_go_offline_until_reconnect() {
        let transport = Arc::new(ScriptedTransport::new());
        let api = Arc::new(FakeApi::new());
        let controller = controller("s1", &transport, &api);

        controller.start().await.unwrap();
        let offline = wait_for(&controller, |s| s.phase == SessionPhase::Offline).await;
        assert_eq!(
            offline.connection.last_error.as_deref(),
            Some("Max reconnection attempts reached")
        );
        assert_eq!(transport.open_count(), 6);
        assert_eq!(controller.metrics_snapshot().await.retries_exhausted, 1);

        let _feed = transport.accept_next();
        controller.reconnect().await.unwrap();
        let live = wait_for(&controller, |s| s.phase == SessionPhase::Live).await;
        assert_eq!(live.connection.reconnect_attempt, 0);
        assert_eq!(live.connection.last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn health_probe_runs_periodically_until_shutdown() {
        let transport = Arc::new(ScriptedTransport::new());
        let _feed = transport.accept_next();
        let api = Arc::new(FakeApi::new());
        let controller = controller("s1", &transport, &api);

        controller.start().await.unwrap();
        let healthy = wait_for(&controller, |s| s.healthy.is_some()).await;
        assert_eq!(healthy.healthy, Some(true));

        api.set_healthy(false);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(controller.snapshot().healthy, Some(false));
        assert_eq!(api.call_count("health"), 2);

        controller.shutdown().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(api.call_count("health"), 2);
        assert_eq!(controller.snapshot().phase, SessionPhase::Idle);
        assert_eq!(transport.live_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_stops_live_updates_but_keeps_state() {
        let transport = Arc::new(ScriptedTransport::new());
        let feed = transport.accept_next();
        let api = Arc::new(FakeApi::new());
        let controller = controller("s1", &transport, &api);

        controller.start().await.unwrap();
        wait_for(&controller, |s| s.phase == SessionPhase::Live).await;
        settle().await;
        feed.send_json(&depth(5.5, 1));
        wait_for(&controller, |s| s.statistics.total_compressions == 1).await;

        controller.disconnect().await;
        feed.send_json(&depth(5.5, 2));
        tokio::time::sleep(Duration::from_secs(30)).await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Idle);
        assert_eq!(snapshot.statistics.total_compressions, 1);
        assert!(!snapshot.connection.connected);
        assert_eq!(transport.open_count(), 1);
        assert_eq!(transport.live_streams(), 0);
    }
}
