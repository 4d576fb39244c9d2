use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::connection::ReconnectPolicy;

pub const API_URL_ENV: &str = "CPR_API_URL";
pub const SESSION_ID_ENV: &str = "CPR_SESSION_ID";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    /// HTTP base of the backend; the stream endpoint is derived from it.
    pub api_base_url: String,
    pub session_id: String,
    /// Maximum number of history points requested on each resync.
    pub history_limit: u32,
    pub health_interval_secs: u64,
    /// Grace delay before the first connect of a session.
    pub initial_connect_delay_ms: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".into(),
            session_id: "default".into(),
            history_limit: 120,
            health_interval_secs: 30,
            initial_connect_delay_ms: 100,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl MonitorSettings {
    /// Applies `CPR_API_URL` / `CPR_SESSION_ID` style overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|value| !value.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(session_id) = lookup(SESSION_ID_ENV).filter(|value| !value.trim().is_empty()) {
            self.session_id = session_id;
        }
    }

    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }
}

/// JSON-file backed settings. A missing file means defaults; an unreadable one
/// is reported and replaced by defaults in memory.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<MonitorSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring malformed settings in {}: {err}", path.display());
                MonitorSettings::default()
            })
        } else {
            MonitorSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Stored settings without environment overrides.
    pub fn settings(&self) -> MonitorSettings {
        self.read().clone()
    }

    /// Remembers the session used last so the next launch resumes it.
    pub fn update_session_id(&self, session_id: &str) -> Result<()> {
        let mut guard = self.write();
        guard.session_id = session_id.to_string();
        self.persist(&guard)
    }

    pub fn update_api_base_url(&self, api_base_url: &str) -> Result<()> {
        let mut guard = self.write();
        guard.api_base_url = api_base_url.trim_end_matches('/').to_string();
        self.persist(&guard)
    }

    fn persist(&self, data: &MonitorSettings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, MonitorSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, MonitorSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
