//! In-memory doubles for the transport and the backend RPC surface.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::api::{
    DepthHistory, HealthStatus, HistoryPoint, LastResult, ModeStatus, ModeUpdate, MonitorApi,
    ResetConfirmation,
};
use crate::connection::{FrameStream, Transport};
use crate::error::MonitorError;
use crate::models::{InferenceResult, WindowMode};

enum FeedItem {
    Text(String),
    Fail(String),
}

enum OpenScript {
    Fail(String),
    Accept(mpsc::UnboundedReceiver<FeedItem>),
}

/// Test-side handle of one scripted stream.
pub struct StreamFeed {
    tx: Option<mpsc::UnboundedSender<FeedItem>>,
}

impl StreamFeed {
    pub fn send_text(&self, text: &str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(FeedItem::Text(text.to_string()));
        }
    }

    pub fn send_json(&self, value: &serde_json::Value) {
        self.send_text(&value.to_string());
    }

    /// Ends the stream with a transport error.
    pub fn fail(&self, message: &str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(FeedItem::Fail(message.to_string()));
        }
    }

    /// Ends the stream as a peer close.
    pub fn close(&mut self) {
        self.tx = None;
    }
}

/// Transport whose opens follow a queued script. With nothing queued an open
/// fails, which keeps unscripted reconnects from ever succeeding.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<OpenScript>>,
    opened_sessions: Mutex<Vec<String>>,
    open_count: AtomicUsize,
    live_streams: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, message: &str) {
        self.push(OpenScript::Fail(message.to_string()));
    }

    pub fn accept_next(&self) -> StreamFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(OpenScript::Accept(rx));
        StreamFeed { tx: Some(tx) }
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::SeqCst)
    }

    pub fn opened_sessions(&self) -> Vec<String> {
        self.opened_sessions.lock().unwrap().clone()
    }

    fn push(&self, script: OpenScript) {
        self.scripts.lock().unwrap().push_back(script);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, session_id: &str) -> Result<Box<dyn FrameStream>, MonitorError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(OpenScript::Accept(rx)) => {
                self.opened_sessions.lock().unwrap().push(session_id.to_string());
                self.live_streams.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(ScriptedStream {
                    rx,
                    live: Arc::clone(&self.live_streams),
                }))
            }
            Some(OpenScript::Fail(message)) => Err(MonitorError::Transport(message)),
            None => Err(MonitorError::Transport("connection refused".into())),
        }
    }
}

struct ScriptedStream {
    rx: mpsc::UnboundedReceiver<FeedItem>,
    live: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameStream for ScriptedStream {
    async fn next_frame(&mut self) -> Option<Result<String, MonitorError>> {
        match self.rx.recv().await? {
            FeedItem::Text(text) => Some(Ok(text)),
            FeedItem::Fail(message) => Some(Err(MonitorError::Transport(message))),
        }
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeApiState {
    healthy: bool,
    histories: HashMap<String, Vec<f64>>,
    history_latency: HashMap<String, Duration>,
    last_results: HashMap<String, InferenceResult>,
    modes: HashMap<String, WindowMode>,
    mode_latency: Duration,
    failures: HashMap<&'static str, String>,
    calls: Vec<String>,
}

/// Backend double: per-session histories with optional latency, a mode per
/// session, injectable failures per operation, and a call log.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeApiState>,
}

impl FakeApi {
    pub fn new() -> Self {
        let api = Self::default();
        api.state.lock().unwrap().healthy = true;
        api
    }

    pub fn set_history(&self, session_id: &str, depths: &[f64]) {
        self.state
            .lock()
            .unwrap()
            .histories
            .insert(session_id.to_string(), depths.to_vec());
    }

    pub fn set_history_latency(&self, session_id: &str, latency: Duration) {
        self.state
            .lock()
            .unwrap()
            .history_latency
            .insert(session_id.to_string(), latency);
    }

    pub fn set_last_result(&self, session_id: &str, result: InferenceResult) {
        self.state
            .lock()
            .unwrap()
            .last_results
            .insert(session_id.to_string(), result);
    }

    pub fn set_mode_latency(&self, latency: Duration) {
        self.state.lock().unwrap().mode_latency = latency;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().unwrap().healthy = healthy;
    }

    /// Makes `operation` ("health", "history", "last", "reset", "get_mode",
    /// "set_mode") fail with `message` until cleared.
    pub fn fail(&self, operation: &'static str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(operation, message.to_string());
    }

    pub fn clear_failure(&self, operation: &'static str) {
        self.state.lock().unwrap().failures.remove(operation);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, operation: &'static str, call: String) -> Result<(), MonitorError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.failures.get(operation) {
            Some(message) => Err(MonitorError::rpc(rpc_name(operation), message.clone())),
            None => Ok(()),
        }
    }
}

fn rpc_name(operation: &str) -> &'static str {
    match operation {
        "health" => "Health check",
        "history" => "Get depth data",
        "last" => "Get last result",
        "reset" => "Reset session",
        "get_mode" => "Get mode",
        _ => "Update mode",
    }
}

#[async_trait]
impl MonitorApi for FakeApi {
    async fn health(&self) -> Result<HealthStatus, MonitorError> {
        self.record("health", "health".into())?;
        let healthy = self.state.lock().unwrap().healthy;
        Ok(HealthStatus {
            status: if healthy { "ok" } else { "degraded" }.into(),
        })
    }

    async fn fetch_history(&self, session_id: &str, limit: u32) -> Result<DepthHistory, MonitorError> {
        let latency = self
            .state
            .lock()
            .unwrap()
            .history_latency
            .get(session_id)
            .copied();
        self.record("history", format!("history:{session_id}"))?;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let depths = self
            .state
            .lock()
            .unwrap()
            .histories
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        let skip = depths.len().saturating_sub(limit as usize);
        let depth_data: Vec<HistoryPoint> = depths
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(index, depth)| HistoryPoint {
                depth: *depth,
                timestamp: index as f64,
                index: Some(index as u32),
            })
            .collect();
        Ok(DepthHistory {
            buffer_len: 0,
            total_count: Some(depth_data.len() as u32),
            depth_data,
        })
    }

    async fn last_result(&self, session_id: &str) -> Result<LastResult, MonitorError> {
        self.record("last", format!("last:{session_id}"))?;
        Ok(LastResult {
            buffer_len: 0,
            result: self.state.lock().unwrap().last_results.get(session_id).cloned(),
        })
    }

    async fn reset_session(&self, session_id: &str) -> Result<ResetConfirmation, MonitorError> {
        self.record("reset", format!("reset:{session_id}"))?;
        let mut state = self.state.lock().unwrap();
        let before = state
            .histories
            .remove(session_id)
            .map(|depths| depths.len() as u32)
            .unwrap_or(0);
        state.last_results.remove(session_id);
        Ok(ResetConfirmation {
            ok: true,
            message: None,
            total_compressions_before_reset: before,
        })
    }

    async fn get_mode(&self, session_id: &str) -> Result<ModeStatus, MonitorError> {
        self.record("get_mode", format!("get_mode:{session_id}"))?;
        let mode = self
            .state
            .lock()
            .unwrap()
            .modes
            .get(session_id)
            .copied()
            .unwrap_or_default();
        Ok(ModeStatus {
            mode,
            available_modes: vec!["sliding".into(), "nonoverlap".into()],
        })
    }

    async fn set_mode(&self, session_id: &str, mode: WindowMode) -> Result<ModeUpdate, MonitorError> {
        let latency = self.state.lock().unwrap().mode_latency;
        self.record("set_mode", format!("set_mode:{session_id}:{}", mode.as_wire()))?;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let old_mode = self
            .state
            .lock()
            .unwrap()
            .modes
            .insert(session_id.to_string(), mode)
            .unwrap_or_default();
        Ok(ModeUpdate {
            old_mode,
            new_mode: mode,
            message: None,
        })
    }
}
