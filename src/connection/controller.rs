use log::{debug, error, info};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::backoff::ReconnectPolicy;
use super::loop_worker::{connection_loop, ConnectionEvent, WorkerContext};
use super::state::ConnectionState;
use super::transport::Transport;

struct ActiveWorker {
    session_id: String,
    generation: u64,
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Owns the transport and the reconnect chain for the active session. At most
/// one worker, and so at most one live stream, exists at any time.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    state: Arc<Mutex<ConnectionState>>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    worker: Option<ActiveWorker>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: ReconnectPolicy,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self {
            transport,
            policy,
            state: Arc::new(Mutex::new(ConnectionState::new())),
            events,
            worker: None,
        }
    }

    /// Shared read handle on the link status.
    pub fn state_handle(&self) -> Arc<Mutex<ConnectionState>> {
        Arc::clone(&self.state)
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.lock().await.clone()
    }

    /// Whether a worker is opening, streaming, or waiting to reconnect.
    pub fn is_active(&self) -> bool {
        self.worker
            .as_ref()
            .map(|worker| !worker.handle.is_finished())
            .unwrap_or(false)
    }

    /// Starts a connection for `session_id`. A no-op when a worker for the same
    /// session and generation is still running; any other running worker is
    /// shut down first. Returns whether a new worker was started.
    pub async fn connect(&mut self, session_id: &str, generation: u64) -> bool {
        if let Some(worker) = &self.worker {
            if !worker.handle.is_finished() {
                if worker.session_id == session_id && worker.generation == generation {
                    debug!("connect ignored: session {session_id} already connected or connecting");
                    return false;
                }
                self.disconnect().await;
            }
        }
        self.worker = None;

        // A caller-initiated connect starts a fresh retry chain.
        self.state.lock().await.reconnect_attempt = 0;

        let cancel_token = CancellationToken::new();
        let ctx = WorkerContext {
            session_id: session_id.to_string(),
            generation,
            transport: Arc::clone(&self.transport),
            policy: self.policy,
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            cancel_token: cancel_token.clone(),
        };

        info!("connecting to session {session_id}");
        let handle = tokio::spawn(connection_loop(ctx));

        self.worker = Some(ActiveWorker {
            session_id: session_id.to_string(),
            generation,
            handle,
            cancel_token,
        });
        true
    }

    /// Clean close: cancels any pending reconnect, waits for the worker to
    /// exit, and clears the link status.
    pub async fn disconnect(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel_token.cancel();
            if let Err(err) = worker.handle.await {
                error!("connection worker for session {} failed to join: {err}", worker.session_id);
            }
            info!("disconnected from session {}", worker.session_id);
        }
        self.state.lock().await.clear();
    }
}
