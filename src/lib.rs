pub mod alerts;
pub mod api;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod models;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod stats;
mod utils;

#[cfg(test)]
pub(crate) mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};
use uuid::Uuid;

pub use api::{HttpApi, MonitorApi};
pub use connection::{ReconnectPolicy, Transport, WebSocketTransport};
pub use error::MonitorError;
pub use models::{Alert, AlertSeverity, InferenceResult, SessionPhase, WindowMode};
pub use session::{SessionController, SessionSnapshot};
pub use settings::{MonitorSettings, SettingsStore};
pub use stats::{RunningStatistics, StatisticsAggregator};

/// Command-line choices layered over the settings file.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_path: PathBuf,
    pub api_url: Option<String>,
    pub session_id: Option<String>,
    /// Start a fresh session under a random id.
    pub new_session: bool,
    pub mode: Option<WindowMode>,
}

/// Initializes logging from `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Runs the engine against a live backend and logs session updates until
/// Ctrl-C.
pub async fn run(options: RunOptions) -> anyhow::Result<()> {
    let store = SettingsStore::new(options.config_path)?;
    let mut settings = store.settings().with_env_overrides();
    if let Some(api_url) = options.api_url {
        if let Err(err) = store.update_api_base_url(&api_url) {
            warn!("Could not remember backend URL: {err:#}");
        }
        settings.api_base_url = api_url;
    }
    if options.new_session {
        settings.session_id = Uuid::new_v4().to_string();
    } else if let Some(session_id) = options.session_id {
        settings.session_id = session_id;
    }
    if let Err(err) = store.update_session_id(&settings.session_id) {
        warn!("Could not remember session id: {err:#}");
    }

    let api = Arc::new(HttpApi::new(&settings.api_base_url)?);
    info!(
        "CPR monitor starting: backend {}, session {}",
        api.base_url(),
        settings.session_id
    );

    let transport = Arc::new(WebSocketTransport::new(&settings.api_base_url));
    let controller = SessionController::new(settings, transport, api);
    controller.start().await?;

    if let Some(mode) = options.mode {
        match controller.set_mode(mode).await {
            Ok(active) => info!("Window mode is {active}"),
            Err(err) => warn!("Could not switch window mode: {err}"),
        }
    }

    let mut updates = controller.subscribe();
    let mut last_logged: Option<String> = None;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = describe(&updates.borrow_and_update());
                if last_logged.as_deref() != Some(line.as_str()) {
                    info!("{line}");
                    last_logged = Some(line);
                }
            }
        }
    }

    controller.shutdown().await;
    let metrics = controller.metrics_snapshot().await;
    info!(
        "Stopped after {} frames ({} malformed, {} reconnects)",
        metrics.frames_received, metrics.parse_errors, metrics.reconnects_scheduled
    );
    Ok(())
}

fn describe(snapshot: &SessionSnapshot) -> String {
    let stats = snapshot.statistics;
    let mut line = format!(
        "[{:?}] {} compressions, avg {:.2} cm, shallow {:.1}%, deep {:.1}%, buffer {}, mode {} | {:?}: {}",
        snapshot.phase,
        stats.total_compressions,
        stats.average_depth,
        stats.percentage_shallow,
        stats.percentage_deep,
        snapshot.buffer_len,
        snapshot.mode,
        snapshot.alert.severity,
        snapshot.alert.message,
    );
    if let Some(prediction) = &snapshot.prediction {
        line.push_str(&format!(" | model: {}", prediction.class_label));
        if let Some(confidence) = prediction.confidence() {
            line.push_str(&format!(" ({:.0}%)", confidence * 100.0));
        }
    }
    if let Some(error) = &snapshot.connection.last_error {
        line.push_str(&format!(" | link: {error}"));
    }
    if let Some(error) = &snapshot.rpc_error {
        line.push_str(&format!(" | rpc: {error}"));
    }
    line
}
