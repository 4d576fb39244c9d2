use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::MonitorError;

use super::backoff::ReconnectPolicy;
use super::state::ConnectionState;
use super::transport::{FrameStream, Transport};

// Set to false to silence per-frame and reconnect logging
const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "cpr_monitor::connection";

use crate::{log_debug, log_error, log_info, log_warn};

/// Something the connection worker observed. `generation` is the value the
/// worker was started with, so consumers can drop events from a worker they
/// have already retired.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionEvent {
    pub generation: u64,
    pub kind: ConnectionEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEventKind {
    Opened,
    Frame(String),
    /// The stream ended or failed to open without being asked to.
    Closed { error: Option<String> },
    ReconnectScheduled { attempt: u32, delay: Duration },
    RetriesExhausted,
}

pub(crate) struct WorkerContext {
    pub session_id: String,
    pub generation: u64,
    pub transport: Arc<dyn Transport>,
    pub policy: ReconnectPolicy,
    pub state: Arc<Mutex<ConnectionState>>,
    pub events: mpsc::UnboundedSender<ConnectionEvent>,
    pub cancel_token: CancellationToken,
}

impl WorkerContext {
    fn emit(&self, kind: ConnectionEventKind) {
        let _ = self.events.send(ConnectionEvent {
            generation: self.generation,
            kind,
        });
    }
}

enum StreamEnd {
    Cancelled,
    Closed(Option<String>),
}

/// Owns one logical connection: opens the stream, forwards frames in arrival
/// order, and reconnects after abnormal closes until the policy gives up or
/// the token is cancelled. Nothing is emitted after cancellation.
pub(crate) async fn connection_loop(ctx: WorkerContext) {
    loop {
        let opened = tokio::select! {
            _ = ctx.cancel_token.cancelled() => return,
            opened = ctx.transport.open(&ctx.session_id) => opened,
        };

        let close_error = match opened {
            Ok(mut stream) => {
                ctx.state.lock().await.mark_open();
                log_info!("stream opened for session {}", ctx.session_id);
                ctx.emit(ConnectionEventKind::Opened);

                match pump_frames(&ctx, stream.as_mut()).await {
                    StreamEnd::Cancelled => {
                        stream.close().await;
                        return;
                    }
                    StreamEnd::Closed(error) => error,
                }
            }
            Err(err) => {
                log_warn!("failed to open stream for session {}: {}", ctx.session_id, err);
                Some(err.to_string())
            }
        };

        if ctx.cancel_token.is_cancelled() {
            return;
        }

        let attempt = {
            let mut state = ctx.state.lock().await;
            state.mark_closed(close_error.clone());
            state.reconnect_attempt
        };
        ctx.emit(ConnectionEventKind::Closed { error: close_error });

        let Some(delay) = ctx.policy.delay_for(attempt) else {
            log_error!(
                "giving up on session {} after {} reconnect attempts",
                ctx.session_id,
                attempt
            );
            ctx.state.lock().await.last_error = Some(MonitorError::ExhaustedRetries.to_string());
            ctx.emit(ConnectionEventKind::RetriesExhausted);
            return;
        };

        log_info!(
            "reconnecting session {} in {}ms (attempt {}/{})",
            ctx.session_id,
            delay.as_millis(),
            attempt + 1,
            ctx.policy.max_attempts
        );
        ctx.emit(ConnectionEventKind::ReconnectScheduled {
            attempt: attempt + 1,
            delay,
        });

        tokio::select! {
            _ = ctx.cancel_token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        ctx.state.lock().await.reconnect_attempt = attempt + 1;
    }
}

async fn pump_frames(ctx: &WorkerContext, stream: &mut dyn FrameStream) -> StreamEnd {
    loop {
        tokio::select! {
            _ = ctx.cancel_token.cancelled() => return StreamEnd::Cancelled,
            frame = stream.next_frame() => match frame {
                Some(Ok(text)) => {
                    log_debug!("frame received ({} bytes)", text.len());
                    ctx.emit(ConnectionEventKind::Frame(text));
                }
                Some(Err(err)) => {
                    log_warn!("stream error on session {}: {}", ctx.session_id, err);
                    return StreamEnd::Closed(Some(err.to_string()));
                }
                None => {
                    log_info!("stream closed by peer for session {}", ctx.session_id);
                    return StreamEnd::Closed(None);
                }
            }
        }
    }
}
