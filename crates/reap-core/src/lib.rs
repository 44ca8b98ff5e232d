//! reap-core - Core library for reap
//!
//! This crate contains the per-folder metadata store, the chunked tombstone
//! collector and the maintenance scheduler that drives it.

pub mod config;
pub mod db;
pub mod error;
pub mod gc;
pub mod models;
pub mod services;
pub mod state;

pub use config::{DatabaseOptions, MaintenanceConfig};
pub use db::{Database, FolderDb};
pub use error::{Error, Result};
pub use models::{DeviceId, FileFlags, FileRecord, VersionVector, LOCAL_DEVICE_ID};
pub use services::{BackgroundService, MaintenanceService};
pub use state::ServiceState;
