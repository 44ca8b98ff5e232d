use std::path::Path;

use reap_core::{Database, DatabaseOptions, MaintenanceConfig};

use crate::error::CliError;
use crate::lock::StoreLock;

/// Host the periodic scheduler until Ctrl-C
pub async fn run_serve(
    data_dir: &Path,
    options: DatabaseOptions,
    config: MaintenanceConfig,
) -> Result<(), CliError> {
    let _lock = StoreLock::acquire(data_dir)?;

    let db = Database::open(data_dir, options)?;
    if !db.options().gc_enabled() {
        tracing::warn!("Delete retention is zero, tombstones will never be collected");
    }

    let service = db.service_with_config(config)?;
    service.start()?;
    tracing::info!(dir = %db.dir().display(), "Serving maintenance");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupted, shutting down");

    // The loop must be gone before the store closes and the lock drops
    if let Some(task) = service.stop() {
        if let Err(error) = task.await {
            tracing::warn!(%error, "Maintenance loop ended abnormally");
        }
    }
    drop(service);
    db.close()?;
    Ok(())
}
