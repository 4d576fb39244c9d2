use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MonitorError;

/// Compression count at which the backend closes out a session and resets it.
pub const SESSION_COMPRESSION_LIMIT: u32 = 120;

/// How raw readings are grouped into inference windows. The windowing itself
/// happens in the backend; the engine only tracks which policy is active.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WindowMode {
    /// Overlapping windows; inference advances one reading at a time.
    #[serde(rename = "sliding")]
    Sliding,
    /// Disjoint windows; the buffer clears after each inference.
    #[serde(
        rename = "nonoverlap",
        alias = "non-overlap",
        alias = "non_overlap",
        alias = "nonoverlapping"
    )]
    NonOverlap,
}

impl Default for WindowMode {
    fn default() -> Self {
        WindowMode::NonOverlap
    }
}

impl WindowMode {
    pub fn as_wire(&self) -> &'static str {
        match self {
            WindowMode::Sliding => "sliding",
            WindowMode::NonOverlap => "nonoverlap",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            WindowMode::Sliding => WindowMode::NonOverlap,
            WindowMode::NonOverlap => WindowMode::Sliding,
        }
    }
}

impl fmt::Display for WindowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowMode::Sliding => f.write_str("sliding"),
            WindowMode::NonOverlap => f.write_str("non-overlap"),
        }
    }
}

impl FromStr for WindowMode {
    type Err = MonitorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect();

        match normalized.as_str() {
            "sliding" => Ok(WindowMode::Sliding),
            "nonoverlap" | "nonoverlapping" => Ok(WindowMode::NonOverlap),
            _ => Err(MonitorError::InvalidMode(value.to_string())),
        }
    }
}

/// Lifecycle of the single active session held by the controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    /// No live stream is wanted.
    Idle,
    /// Stream opening, or waiting out a reconnect delay.
    Connecting,
    /// Stream open and delivering frames.
    Live,
    /// A manual reset is in flight.
    Resetting,
    /// Session identity is being replaced.
    SwitchingSession,
    /// Reconnect attempts exhausted. State is kept; `reconnect()` recovers.
    Offline,
}

impl Default for SessionPhase {
    fn default() -> Self {
        SessionPhase::Idle
    }
}

impl SessionPhase {
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;

        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (Idle, Connecting | SwitchingSession | Resetting)
                | (Connecting, Live | Offline | Resetting | SwitchingSession | Idle)
                | (Live, Connecting | Resetting | SwitchingSession | Idle)
                | (Resetting, Idle | Connecting | Live | Offline)
                | (SwitchingSession, Connecting | Idle)
                | (Offline, Connecting | Resetting | SwitchingSession | Idle)
        )
    }

    /// Phases driven purely by the connection; operation-owned phases
    /// (`Resetting`, `SwitchingSession`) ignore connection events.
    pub fn follows_connection(self) -> bool {
        matches!(
            self,
            SessionPhase::Connecting | SessionPhase::Live | SessionPhase::Offline
        )
    }
}

/// One raw depth sample, as shown on the depth chart.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DepthPoint {
    pub depth_cm: f64,
    /// Seconds, as stamped by the backend.
    pub timestamp: f64,
}
