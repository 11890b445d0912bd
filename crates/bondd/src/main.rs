use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bondd::Config;
use bondd::Engine;
use clap::Parser;
use tokio::sync::oneshot;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Expose devices behind a Bond hub as home-automation entities
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "bondd.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(config.logging.targets())
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("bondd starting");
    info!("Loaded config from: {}", args.config.display());

    let engine = Arc::new(Engine::new());
    let registered = engine.register_integrations_from_config(&config).await;
    if registered == 0 {
        warn!("No integrations configured");
    }

    let engine_task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run().await })
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let api_task = config.api.clone().map(|api| {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = bondd::api::serve(api.listen, api.port, engine, shutdown_rx).await {
                error!("HTTP API server failed: {}", e);
            }
        })
    });

    info!("Press Ctrl+C to exit");

    // Wait for Ctrl+C
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    // Receiver is gone when the API is disabled
    let _ = shutdown_tx.send(());
    if let Some(task) = api_task {
        if let Err(e) = task.await {
            error!("HTTP API task failed: {}", e);
        }
    }

    info!("Shutting down integrations...");
    engine.shutdown().await;
    engine_task.abort();

    info!("bondd shutdown complete");

    Ok(())
}
