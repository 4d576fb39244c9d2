//! Module-gated logging macros for the engine's hot paths.
//!
//! The connection worker and the frame dispatcher log on every frame and every
//! reconnect, which is too chatty to leave on unconditionally. Each module that
//! uses these macros declares two constants:
//!
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! const LOG_TARGET: &str = "cpr_monitor::connection";
//!
//! use crate::{log_info, log_warn};
//!
//! log_info!("stream opened for session {}", session_id);
//! ```
//!
//! Records go through the `log` facade with `LOG_TARGET` as the target, so
//! `RUST_LOG=cpr_monitor::connection=debug` selects one subsystem.

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!(target: LOG_TARGET, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!(target: LOG_TARGET, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!(target: LOG_TARGET, $($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!(target: LOG_TARGET, $($arg)*);
        }
    };
}
