//! Background services

mod maintenance;

use std::any::Any;

use tokio::task::JoinHandle;

use crate::error::Result;

pub use maintenance::MaintenanceService;

/// Handle to a service running on the tokio runtime
pub trait BackgroundService: Send + Sync {
    /// Spawn the service loop on the current tokio runtime
    fn start(&self) -> Result<()>;

    /// Cancel the loop and hand back its task, `None` if it was not running.
    ///
    /// Awaiting the task waits for an in-flight pass to stop at its next
    /// chunk boundary, after which the store can be closed.
    fn stop(&self) -> Option<JoinHandle<()>>;

    /// Checked access to the concrete service, for introspection in tests
    fn as_any(&self) -> &dyn Any;
}
