//! Sweeper binary: scans for integrity issues, optionally fixes them, and
//! reports webhook events whose handler failed.

use std::{io, sync::Arc};

use amora_domain::config::SweeperConfig;
use amora_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use amora_domain::storage::ObjectStore;
use amora_storage::{HttpObjectStore, SeaOrmStorage};
use amora_sweeper::{run_sweeper, SweeperError};

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[sweeper] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), SweeperError> {
    let config = SweeperConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("SWEEPER");
    init_telemetry(&telemetry_config)?;
    let storage = SeaOrmStorage::connect(config.database_url()).await?;
    let objects = HttpObjectStore::from_config(config.object_storage())?
        .map(|store| Arc::new(store) as Arc<dyn ObjectStore>);
    run_sweeper(config, storage, objects).await
}
