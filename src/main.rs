//! RISKPULSE: polling sync engine for DEX risk and signal feeds.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! starts the sync engine and the consumer API, and runs until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use riskpulse::api;
use riskpulse::config::AppConfig;
use riskpulse::engine::SyncEngine;
use riskpulse::fetch::http::ReqwestSource;
use riskpulse::types::SyncSnapshot;

const BANNER: &str = r#"
 ___ ___ ___ _  _____ _   _ _    ___ ___
| _ \_ _/ __| |/ / _ \ | | | |  / __| __|
|   /| |\__ \ ' <|  _/ |_| | |__\__ \ _|
|_|_\___|___/_|\_\_|  \___/|____|___/___|

  DEX risk & signal sync engine
"#;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let config_path = AppConfig::resolve_path();
    let (cfg, found) = AppConfig::load_or_default(&config_path)?;
    if !found {
        warn!(path = %config_path, "Config file not found, using defaults");
    }

    println!("{BANNER}");
    info!(
        risks_url = %cfg.sync.risks_url,
        signals_url = %cfg.sync.signals_url,
        interval_secs = cfg.sync.interval_secs,
        max_attempts = cfg.retry.max_attempts,
        "RISKPULSE starting up"
    );

    // -- Engine ----------------------------------------------------------

    let source = Arc::new(ReqwestSource::new(cfg.http_timeout(), &cfg.http.user_agent)?);
    let engine = SyncEngine::new(cfg.engine_config(), source);
    let view = engine.view();

    let api_task = if cfg.api.enabled {
        Some(api::spawn_api(view.clone(), cfg.api.port).await?)
    } else {
        info!("API disabled");
        None
    };

    let mut updates = view.subscribe()?;
    let handle = engine.start();

    // -- Main loop -------------------------------------------------------

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Engine running. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                log_snapshot(&updates.borrow_and_update());
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    handle.stop().await;
    if let Some(task) = api_task {
        task.abort();
    }

    info!("RISKPULSE shut down cleanly.");
    Ok(())
}

/// Log a one-line summary of a published snapshot.
fn log_snapshot(snap: &SyncSnapshot) {
    match &snap.error {
        Some(error) => warn!(
            cycles = snap.cycles,
            records = snap.data.len(),
            error = %error,
            "Serving stale data"
        ),
        None => info!(
            cycles = snap.cycles,
            records = snap.data.len(),
            filtered = snap.filtered_data.len(),
            signals = snap.signals.len(),
            filters = ?snap.filters,
            "Snapshot published"
        ),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("riskpulse=info"));

    let json_logging = std::env::var("RISKPULSE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
