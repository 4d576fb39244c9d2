//! Contract of the backend RPC surface the engine calls: health, depth
//! history, last inference, reset, and window mode. The engine only depends on
//! [`MonitorApi`]; [`HttpApi`] is the production implementation.

mod http;

pub use http::HttpApi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;
use crate::models::{InferenceResult, WindowMode};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryPoint {
    pub depth: f64,
    pub timestamp: f64,
    #[serde(default)]
    pub index: Option<u32>,
}

/// Recent depth readings for a session, oldest first, plus the current
/// inference buffer occupancy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepthHistory {
    pub buffer_len: u32,
    pub depth_data: Vec<HistoryPoint>,
    #[serde(default, alias = "total_points")]
    pub total_count: Option<u32>,
}

impl DepthHistory {
    pub fn depths(&self) -> Vec<f64> {
        self.depth_data.iter().map(|point| point.depth).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastResult {
    pub buffer_len: u32,
    #[serde(default)]
    pub result: Option<InferenceResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResetConfirmation {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub total_compressions_before_reset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModeStatus {
    pub mode: WindowMode,
    #[serde(default)]
    pub available_modes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModeUpdate {
    pub old_mode: WindowMode,
    pub new_mode: WindowMode,
    #[serde(default)]
    pub message: Option<String>,
}

#[async_trait]
pub trait MonitorApi: Send + Sync + 'static {
    async fn health(&self) -> Result<HealthStatus, MonitorError>;

    async fn fetch_history(&self, session_id: &str, limit: u32) -> Result<DepthHistory, MonitorError>;

    async fn last_result(&self, session_id: &str) -> Result<LastResult, MonitorError>;

    async fn reset_session(&self, session_id: &str) -> Result<ResetConfirmation, MonitorError>;

    async fn get_mode(&self, session_id: &str) -> Result<ModeStatus, MonitorError>;

    async fn set_mode(&self, session_id: &str, mode: WindowMode) -> Result<ModeUpdate, MonitorError>;
}
