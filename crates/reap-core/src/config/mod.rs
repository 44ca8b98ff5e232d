//! Store and scheduler configuration.
//!
//! Both structs deserialize from JSON with durations given in whole seconds,
//! so an operator can keep them next to the data directory.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::gc::KEY_SPACE;

/// Number of key ranges a collection pass is split into
pub const DEFAULT_GC_FANOUT: usize = 8;

/// Default tick of the background maintenance loop
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(8 * 60 * 60);

/// Options applied when opening a [`crate::Database`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseOptions {
    /// Minimum age of a tombstone before it may be removed. Zero disables
    /// tombstone collection for the store.
    #[serde(default, with = "duration_secs")]
    pub delete_retention: Duration,
    /// Number of chunks a collection pass is split into
    #[serde(default = "default_gc_fanout")]
    pub gc_fanout: usize,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            delete_retention: Duration::ZERO,
            gc_fanout: DEFAULT_GC_FANOUT,
        }
    }
}

impl DatabaseOptions {
    #[must_use]
    pub const fn with_delete_retention(mut self, retention: Duration) -> Self {
        self.delete_retention = retention;
        self
    }

    #[must_use]
    pub const fn with_gc_fanout(mut self, fanout: usize) -> Self {
        self.gc_fanout = fanout;
        self
    }

    /// Whether tombstone collection is enabled at all
    pub const fn gc_enabled(&self) -> bool {
        !self.delete_retention.is_zero()
    }

    pub fn validate(&self) -> Result<()> {
        let fanout = u64::try_from(self.gc_fanout).unwrap_or(u64::MAX);
        if fanout == 0 || fanout > KEY_SPACE {
            return Err(Error::InvalidInput(format!(
                "gc_fanout must be between 1 and {KEY_SPACE}, got {}",
                self.gc_fanout
            )));
        }
        Ok(())
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaintenanceConfig {
    /// Tick interval of the background loop
    #[serde(default = "default_interval", with = "duration_secs")]
    pub interval: Duration,
    /// Force a pass on an unchanged folder once its last successful
    /// collection is older than this. `None` skips unchanged folders forever.
    #[serde(default, with = "option_duration_secs")]
    pub max_skip: Option<Duration>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MAINTENANCE_INTERVAL,
            max_skip: None,
        }
    }
}

impl MaintenanceConfig {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_skip: None,
        }
    }

    #[must_use]
    pub const fn with_max_skip(mut self, max_skip: Duration) -> Self {
        self.max_skip = Some(max_skip);
        self
    }

    pub fn validate(&self) -> Result<()> {
        // tokio::time::interval panics on a zero period
        if self.interval.is_zero() {
            return Err(Error::InvalidInput(
                "maintenance interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Load a JSON config file
pub fn load_json<T: serde::de::DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

const fn default_gc_fanout() -> usize {
    DEFAULT_GC_FANOUT
}

const fn default_interval() -> Duration {
    DEFAULT_MAINTENANCE_INTERVAL
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod option_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}
