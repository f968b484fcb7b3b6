use anyhow::Result;
use dotenv::dotenv;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use referral_ledger::api;
use referral_ledger::clock::SystemClock;
use referral_ledger::config::Config;
use referral_ledger::db::init_database;
use referral_ledger::ledger::Ledger;
use referral_ledger::notify::LogNotifier;
use referral_ledger::scheduler;
use referral_ledger::store::postgres::PgStore;
use referral_ledger::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,referral_ledger=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let _config = Config::init()?;
    info!("Initialized configuration");

    // Initialize database and the store/engine stack
    let db = Arc::new(init_database().await?);
    info!("Connected to database");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(db));
    let ledger = Arc::new(Ledger::new(
        store.clone(),
        Arc::new(SystemClock),
        Arc::new(LogNotifier),
    ));

    // Start the automatic dividend payment loop
    let scheduler_ledger = ledger.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler::run_auto_payment_loop(scheduler_ledger).await;
    });

    // Start API server
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::start_api_server(store, ledger).await {
            error!("API server error: {}", e);
        }
    });

    // Handle shutdown signals
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, initiating graceful shutdown"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        std::process::exit(0);
    });

    // Wait for all tasks to complete
    let _ = tokio::join!(scheduler_handle, api_handle);

    info!("Referral ledger shutdown complete");
    Ok(())
}
