#![allow(clippy::result_large_err)]

use dotenvy::dotenv;
use marketplace::{
    config::{database, settings},
    core::{cache::PricingCache, payment::FakeGateway, worker},
    errors::Result,
};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load marketplace settings
    let settings = settings::load_default_settings()
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;
    info!("Settings loaded: {:?}", settings);

    // 4. Connect and make sure every table exists
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|()| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Run the background loops until Ctrl-C
    let cache = PricingCache::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let payments = tokio::spawn(worker::run_payment_worker(
        db.clone(),
        FakeGateway,
        settings.payment_poll_interval(),
        shutdown_rx.clone(),
    ));
    let sweep = tokio::spawn(worker::run_discount_sweep(
        db.clone(),
        cache,
        settings.discount_sweep_interval(),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);

    for handle in [payments, sweep] {
        if let Err(e) = handle.await {
            error!("Background task ended abnormally: {}", e);
        }
    }

    db.close().await?;
    Ok(())
}
