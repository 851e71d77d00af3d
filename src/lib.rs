pub mod aggregator;
pub mod backoff;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
mod fleet;
pub mod manager;
pub mod repair_log;
pub mod state;
mod supervisor;
pub mod throttle;
pub mod transport;
pub mod types;

use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

pub use error::{FeedError, FeedResult};
pub use events::ManagerEvent;
pub use manager::ConnectionManager;
pub use types::config::{BackoffConfig, ManagerConfig};
pub use types::connection::{ConnectionSnapshot, ConnectionStatus};
pub use types::endpoint::Endpoint;
pub use types::repair::{RepairAction, RepairLogEntry};

/// How often the headless runner logs the dashboard overview.
const OVERVIEW_INTERVAL: Duration = Duration::from_secs(5);

/// Initialize structured logging with tracing.
/// Respects RUST_LOG env var; defaults to `info` level for feedwatch crates.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feedwatch_lib=info,feedwatch=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration, then supervise the configured feeds until Ctrl-C.
pub fn run() -> FeedResult<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let path = config::config_path_from_env();
    let mut feeds = config::load_config(&path)?;
    config::apply_env_overrides(&mut feeds)?;
    config::validate(&feeds)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(feeds))
}

async fn serve(feeds: ManagerConfig) -> FeedResult<()> {
    let manager = ConnectionManager::with_websockets(feeds)?;
    manager.start()?;

    let mut overview = tokio::time::interval(OVERVIEW_INTERVAL);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown requested");
                break;
            }
            _ = overview.tick() => {
                let summary = commands::feeds::overview(&manager);
                let connected = summary
                    .connections
                    .iter()
                    .filter(|c| c.is_connected())
                    .count();
                info!(
                    health = summary.health_score,
                    connected,
                    total = summary.connections.len(),
                    auto_repair = summary.auto_repair,
                    "Feed overview"
                );
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}

/// Start a websocket-backed manager inside a Tauri app, forward its events
/// to the webview and register it as managed state for the
/// `commands::feeds::feeds_*` handlers.
#[cfg(feature = "desktop")]
pub fn manage_feeds<R: tauri::Runtime>(
    app: &tauri::App<R>,
    feeds: ManagerConfig,
) -> FeedResult<()> {
    use tauri::Manager;

    let manager = ConnectionManager::with_websockets(feeds)?;
    tauri::async_runtime::block_on(async { manager.start() })?;
    events::forward_events(app.handle().clone(), manager.subscribe());
    app.manage(manager);
    Ok(())
}
