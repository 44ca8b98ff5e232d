use std::path::Path;

use reap_core::{Database, DatabaseOptions, MaintenanceConfig, MaintenanceService};
use tokio_util::sync::CancellationToken;

use crate::error::CliError;
use crate::lock::StoreLock;

/// Collect expired tombstones in every folder of the store at `data_dir`.
///
/// Refuses to touch the store while another process holds its lock.
pub async fn run_maintenance(data_dir: &Path, options: DatabaseOptions) -> Result<(), CliError> {
    let lock = StoreLock::acquire(data_dir)?;

    let db = Database::open(data_dir, options)?;
    let service = MaintenanceService::new(db.clone(), MaintenanceConfig::default())?;

    // Ctrl-C stops the pass at the next chunk; finished chunks stay committed
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(cancel_on_interrupt(cancel.clone()));

    let result = service.run_maintenance_once(&cancel).await;
    interrupt.abort();
    drop(service);
    db.close()?;
    result?;

    tracing::info!(path = %lock.path().display(), "Store maintenance complete");
    Ok(())
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Interrupted, stopping");
        cancel.cancel();
    }
}
