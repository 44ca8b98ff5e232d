use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The store could not be read or written
pub const EXIT_STORAGE: i32 = 1;
/// Bad flags, config or arguments; clap uses the same status
pub const EXIT_USAGE: i32 = 2;
/// Another process holds the store lock
pub const EXIT_LOCK_CONFLICT: i32 = 3;
/// Stopped by Ctrl-C
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] reap_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Store is in use by another process (lock held on {})", .0.display())]
    LockConflict(PathBuf),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CliError {
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::LockConflict(_) => EXIT_LOCK_CONFLICT,
            Self::Core(reap_core::Error::Cancelled) => EXIT_INTERRUPTED,
            Self::Core(error) if error.is_storage() => EXIT_STORAGE,
            Self::Io(_) | Self::Serialization(_) => EXIT_STORAGE,
            Self::Core(_) | Self::Config(_) => EXIT_USAGE,
        }
    }
}
