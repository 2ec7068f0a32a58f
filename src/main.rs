mod accounts;
mod aggregation;
mod api;
mod bootstrap;
mod config;
mod dispatch;
mod error;
mod ledger;
mod messages;
mod server;
mod settlement;
mod telegram;

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,teamdues=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting team dues bot");

    let config = config::Config::from_env()?;
    let app = bootstrap::initialize_app(&config).await?;
    let cancel = CancellationToken::new();

    // Update dispatch
    let dispatcher = tokio::spawn(app.dispatcher.clone().run(
        app.telegram.clone(),
        Duration::from_secs(config.poll_interval_secs),
        cancel.clone(),
    ));

    // Daily adjustment and monthly poll
    let scheduler = if config.scheduler_enabled {
        info!("✅ Settlement scheduler enabled at {}:00 local", config.adjust_hour);
        Some(app.scheduler.clone().start(cancel.clone()))
    } else {
        info!("⏸️  Settlement scheduler disabled, use the HTTP triggers");
        None
    };

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("❌ Failed to listen for shutdown signal: {}", e);
        }
        info!("🛑 Shutdown requested");
        shutdown.cancel();
    });

    let router = server::create_app(app.state);
    server::run_server(router, &config.bind_address, cancel.clone()).await?;

    cancel.cancel();
    dispatcher.await?;
    if let Some(scheduler) = scheduler {
        scheduler.await?;
    }

    info!("✓ Shutdown complete");
    Ok(())
}
