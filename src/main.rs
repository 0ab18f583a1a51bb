//! live-narrator-rs: livestream chat narrator service.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use live_narrator::ai::{AiResponder, Respond};
use live_narrator::api::{self, ApiState};
use live_narrator::config::Config;
use live_narrator::event_log::EventLog;
use live_narrator::narrator::Narrator;
use live_narrator::session::{SessionDeps, SessionManager};
use live_narrator::source::RelaySource;
use live_narrator::state::SharedState;

#[derive(Parser, Debug)]
#[command(name = "live-narrator-rs", about = "Livestream chat narrator service")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("live-narrator-rs starting");

    let config = Config::load(args.config.as_deref());

    let shared = Arc::new(SharedState::new(config.settings.clone()));
    let log = Arc::new(EventLog::new(config.log.capacity));
    let narrator = Narrator::spawn(&config.tts);
    let ai = Arc::new(AiResponder::new(&config.ai));
    let source = Arc::new(RelaySource::new(&config.source));

    if ai.is_enabled() {
        info!("AI replies enabled (model: {})", config.ai.model);
    }

    let sessions = Arc::new(SessionManager::new(SessionDeps {
        shared: shared.clone(),
        log: log.clone(),
        narrator,
        ai,
        source,
        quiet_window: Duration::from_secs(config.reminder.quiet_window_secs),
    }));

    // Static control page on its own port, API on the main one.
    let web_addr = format!("{}:{}", config.server.bind_address, config.server.web_port);
    api::start_static_server(&config.server.web_root, &web_addr).await;

    let api_addr = format!("{}:{}", config.server.bind_address, config.server.api_port);
    info!(
        "Open the control page at http://localhost:{}/",
        config.server.web_port
    );

    let state = ApiState {
        shared,
        log,
        sessions,
    };
    api::serve_api(state, &api_addr).await?;

    Ok(())
}
