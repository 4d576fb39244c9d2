use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::MonitorError;
use crate::models::WindowMode;

use super::{
    DepthHistory, HealthStatus, LastResult, ModeStatus, ModeUpdate, MonitorApi, ResetConfirmation,
};

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// [`MonitorApi`] over the backend's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: &str) -> Result<Self, MonitorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| MonitorError::rpc("client setup", err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn decode<T: DeserializeOwned>(
    operation: &'static str,
    response: Result<Response, reqwest::Error>,
) -> Result<T, MonitorError> {
    let response = response.map_err(|err| MonitorError::rpc(operation, err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let reason = status.canonical_reason().unwrap_or(status.as_str());
        return Err(MonitorError::rpc(operation, reason.to_string()));
    }
    response
        .json::<T>()
        .await
        .map_err(|err| MonitorError::rpc(operation, err.to_string()))
}

#[async_trait]
impl MonitorApi for HttpApi {
    async fn health(&self) -> Result<HealthStatus, MonitorError> {
        decode("Health check", self.client.get(self.url("/health")).send().await).await
    }

    async fn fetch_history(&self, session_id: &str, limit: u32) -> Result<DepthHistory, MonitorError> {
        let request = self
            .client
            .get(self.url(&format!("/depth/{session_id}")))
            .query(&[("limit", limit)]);
        decode("Get depth data", request.send().await).await
    }

    async fn last_result(&self, session_id: &str) -> Result<LastResult, MonitorError> {
        let request = self.client.get(self.url(&format!("/last/{session_id}")));
        decode("Get last result", request.send().await).await
    }

    async fn reset_session(&self, session_id: &str) -> Result<ResetConfirmation, MonitorError> {
        let request = self.client.post(self.url(&format!("/reset/{session_id}")));
        decode("Reset session", request.send().await).await
    }

    async fn get_mode(&self, session_id: &str) -> Result<ModeStatus, MonitorError> {
        let request = self.client.get(self.url(&format!("/mode/{session_id}")));
        decode("Get mode", request.send().await).await
    }

    async fn set_mode(&self, session_id: &str, mode: WindowMode) -> Result<ModeUpdate, MonitorError> {
        let request = self
            .client
            .post(self.url(&format!("/mode/{session_id}")))
            .query(&[("mode", mode.as_wire())]);
        decode("Update mode", request.send().await).await
    }
}
