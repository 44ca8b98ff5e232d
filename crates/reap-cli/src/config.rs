//! Optional JSON config file

use std::path::Path;
use std::time::Duration;

use reap_core::{DatabaseOptions, MaintenanceConfig};
use serde::Deserialize;

use crate::error::CliError;

/// Looked up in the data directory when `--config` is not given
pub const CONFIG_FILE_NAME: &str = "reap.json";

/// Store and scheduler settings; command-line flags override them
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReapConfig {
    pub store: DatabaseOptions,
    pub maintenance: MaintenanceConfig,
}

impl ReapConfig {
    /// Load `explicit`, else `<data_dir>/reap.json` when it exists, else defaults
    pub fn load(explicit: Option<&Path>, data_dir: &Path) -> Result<Self, CliError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = data_dir.join(CONFIG_FILE_NAME);
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };

        let config = reap_core::config::load_json(&path)
            .map_err(|error| CliError::Config(format!("{}: {error}", path.display())))?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn store_options(&self, delete_retention: Option<Duration>) -> DatabaseOptions {
        let options = self.store.clone();
        match delete_retention {
            Some(retention) => options.with_delete_retention(retention),
            None => options,
        }
    }

    pub fn maintenance_config(&self, interval: Option<Duration>) -> MaintenanceConfig {
        MaintenanceConfig {
            interval: interval.unwrap_or(self.maintenance.interval),
            ..self.maintenance.clone()
        }
    }
}
