//! Warden Server: Application entry point.
//!
//! Loads configuration, connects to SurrealDB, wires the PKI and token
//! services, and drives the certificate rotation schedule until shut
//! down.

use std::process::ExitCode;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use warden_db::DbManager;
use warden_server::{ServerError, Warden, WardenConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warden=info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Warden server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), ServerError> {
    info!("Starting Warden server...");

    let config = WardenConfig::from_env()?;
    let db = DbManager::connect(&config.db).await?;
    let warden = Warden::build(db.client(), &config).await?;

    let mut ticker = interval(config.rotation_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        interval_secs = config.rotation_interval.as_secs(),
        "Rotation schedule started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                warden.rotation_tick().await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Warden server stopped.");
    Ok(())
}
