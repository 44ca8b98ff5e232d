//! Process-level exclusive access to a store directory

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::CliError;

pub const LOCK_FILE_NAME: &str = "reap.lock";

/// Advisory lock held for as long as the value lives
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    file: File,
}

impl StoreLock {
    /// Acquire the lock without blocking.
    ///
    /// Fails with [`CliError::LockConflict`] when another process holds it.
    pub fn acquire(data_dir: &Path) -> Result<Self, CliError> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(LOCK_FILE_NAME);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        if let Err(error) = file.try_lock_exclusive() {
            if is_contended(&error) {
                return Err(CliError::LockConflict(path));
            }
            return Err(error.into());
        }

        // Holder pid, for operators inspecting a stuck lock
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        tracing::debug!(path = %path.display(), "Acquired store lock");

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.file) {
            tracing::warn!(%error, path = %self.path.display(), "Failed to release store lock");
        }
    }
}

fn is_contended(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
