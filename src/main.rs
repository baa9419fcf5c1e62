// ArgusDB - query execution core for an intelligence-data analysis platform.
//
// Entry point for the argusdb engine process. Initializes structured
// logging, assembles the engine (record store, cache tiers, query executor,
// export manager), starts background maintenance, and shuts down cleanly on
// Ctrl+C.

use anyhow::Result;
use argus_core::{ArgusConfig, ArgusDb};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Structured JSON logging with environment-based filtering
    // (RUST_LOG=debug,argus=trace). Defaults to 'info' for argus modules.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("argus=info".parse()?),
        )
        .json()
        .init();

    info!("starting argusdb");

    let config = ArgusConfig::load();
    let db = match ArgusDb::new(config).await {
        Ok(db) => {
            info!("argusdb initialized");
            db
        }
        Err(err) => {
            error!("failed to initialize argusdb: {err}");
            return Err(err);
        }
    };

    if let Err(err) = db.start().await {
        error!("failed to start argusdb: {err}");
        return Err(err);
    }

    info!("argusdb started");
    info!("record store: {}", db.config().store.data_dir.display());
    info!("export directory: {}", db.config().export.export_dir.display());

    match signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal, stopping argusdb"),
        Err(err) => error!("unable to listen for shutdown signal: {err}"),
    }

    if let Err(err) = db.stop().await {
        error!("error during argusdb shutdown: {err}");
        return Err(err);
    }

    info!("argusdb stopped");
    Ok(())
}
