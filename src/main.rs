use std::path::PathBuf;

use clap::Parser;
use cpr_monitor::{RunOptions, WindowMode};

/// Live session monitor for the CPR training backend.
#[derive(Debug, Parser)]
#[command(name = "cpr-monitor", version)]
struct Cli {
    /// Settings file; created on first run.
    #[arg(long, default_value = "cpr-monitor.json")]
    config: PathBuf,

    /// Backend base URL, e.g. http://localhost:8000
    #[arg(long)]
    api_url: Option<String>,

    #[arg(long, conflicts_with = "new_session")]
    session: Option<String>,

    /// Start a new session with a random id.
    #[arg(long)]
    new_session: bool,

    /// Window mode to request once connected (sliding | nonoverlap).
    #[arg(long)]
    mode: Option<WindowMode>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cpr_monitor::init_logging();
    let cli = Cli::parse();

    cpr_monitor::run(RunOptions {
        config_path: cli.config,
        api_url: cli.api_url,
        session_id: cli.session,
        new_session: cli.new_session,
        mode: cli.mode,
    })
    .await
}
