use thiserror::Error;

use crate::models::SessionPhase;

/// Error taxonomy for the telemetry engine.
///
/// Nothing here is process-fatal. The worst outcome of any variant is a stale
/// or disconnected session whose accumulated state is still intact.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MonitorError {
    /// The duplex stream failed to open or closed abnormally. Retried by the
    /// connection manager.
    #[error("transport error: {0}")]
    Transport(String),

    /// A frame could not be decoded. The frame is dropped.
    #[error("malformed frame: {0}")]
    Parse(String),

    /// A backend call (history, reset, mode, health) failed. Only the calling
    /// operation is affected.
    #[error("{operation} failed: {message}")]
    Rpc {
        operation: &'static str,
        message: String,
    },

    /// The reconnect chain gave up. A caller-initiated reconnect is required.
    #[error("Max reconnection attempts reached")]
    ExhaustedRetries,

    #[error("unknown window mode '{0}'")]
    InvalidMode(String),

    #[error("illegal session transition {from:?} -> {to:?}")]
    InvalidTransition { from: SessionPhase, to: SessionPhase },
}

impl MonitorError {
    pub fn rpc(operation: &'static str, message: impl Into<String>) -> Self {
        MonitorError::Rpc {
            operation,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
