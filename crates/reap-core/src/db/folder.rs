//! Per-folder store
//!
//! Each folder lives in its own `SQLite` file. The connection sits behind a
//! mutex that is only held for the span of one short transaction, so the
//! tombstone collector and ordinary sync writers interleave chunk by chunk.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::migrations;
use crate::error::{Error, Result};
use crate::models::{name_hash, DeviceId, FileFlags, FileRecord, VersionVector};

/// Row counts for operator introspection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderCounts {
    pub files: i64,
    pub tombstones: i64,
}

/// Handle to one folder's database
pub struct FolderDb {
    folder_id: String,
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for FolderDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderDb")
            .field("folder_id", &self.folder_id)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FolderDb {
    /// Open (creating if needed) the folder database at `path`
    pub(crate) fn open(folder_id: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut conn = Connection::open(&path)?;
        configure(&conn)?;
        migrations::run_folder(&mut conn)?;

        Ok(Self {
            folder_id: folder_id.into(),
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database(format!("folder {} connection poisoned", self.folder_id)))
    }

    /// Run `f` inside one immediate transaction, committing on success
    pub(crate) fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run a read-only closure against the connection
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Insert or replace records announced by `device`.
    ///
    /// Every written record receives a fresh sequence number. Records from a
    /// remote device are flagged `LOCAL_NEEDED` unless the local device
    /// already holds the same version.
    pub fn update(&self, device: &DeviceId, files: &[FileRecord]) -> Result<()> {
        self.transaction(|tx| {
            let device_idx = ensure_device_idx(tx, device)?;
            let local_idx = if device.is_local() {
                None
            } else {
                device_idx_for(tx, &crate::models::LOCAL_DEVICE_ID)?
            };

            for file in files {
                let mut flags = file.flags;
                if !device.is_local() {
                    let have_same = match local_idx {
                        Some(local_idx) => local_version(tx, local_idx, &file.name)?
                            .is_some_and(|version| version == file.version),
                        None => false,
                    };
                    flags = if have_same {
                        flags.without(FileFlags::LOCAL_NEEDED)
                    } else {
                        flags.with(FileFlags::LOCAL_NEEDED)
                    };
                }

                // Delete then insert so the row takes a new sequence
                tx.execute(
                    "DELETE FROM files WHERE device_idx = ? AND name = ?",
                    params![device_idx, file.name],
                )?;
                tx.execute(
                    "INSERT INTO files
                        (device_idx, name, name_hash, modified, size, deleted, local_flags, version)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        device_idx,
                        file.name,
                        name_hash(&file.name).as_slice(),
                        file.modified_nanos(),
                        file.size,
                        i32::from(file.deleted),
                        flags.bits(),
                        serde_json::to_string(&file.version)?,
                    ],
                )?;
            }

            tracing::trace!(
                folder = %self.folder_id,
                device = %device,
                count = files.len(),
                "Updated file records"
            );
            Ok(())
        })
    }

    /// Fetch the record `device` holds for `name`
    pub fn get_device_file(&self, device: &DeviceId, name: &str) -> Result<Option<FileRecord>> {
        self.read(|conn| {
            let Some(device_idx) = device_idx_for(conn, device)? else {
                return Ok(None);
            };

            let row = conn
                .query_row(
                    "SELECT name, modified, version, deleted, size, local_flags, sequence
                     FROM files WHERE device_idx = ? AND name = ?",
                    params![device_idx, name],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i32>(3)? != 0,
                            row.get::<_, i64>(4)?,
                            row.get::<_, u32>(5)?,
                            row.get::<_, i64>(6)?,
                        ))
                    },
                )
                .optional()?;

            let Some((name, modified, version, deleted, size, flags, sequence)) = row else {
                return Ok(None);
            };

            #[allow(clippy::cast_possible_truncation)]
            let modified_ns = modified.rem_euclid(1_000_000_000) as i32;
            Ok(Some(FileRecord {
                name,
                modified_s: modified.div_euclid(1_000_000_000),
                modified_ns,
                version: serde_json::from_str::<VersionVector>(&version)?,
                deleted,
                size,
                flags: FileFlags::from_bits(flags),
                sequence,
            }))
        })
    }

    /// Highest sequence ever assigned in this folder.
    ///
    /// Read from `sqlite_sequence`, so it never moves backwards when the
    /// newest row is collected.
    pub fn top_sequence(&self) -> Result<i64> {
        self.read(top_sequence)
    }

    pub fn counts(&self) -> Result<FolderCounts> {
        self.read(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(deleted), 0) FROM files",
                [],
                |row| {
                    Ok(FolderCounts {
                        files: row.get(0)?,
                        tombstones: row.get(1)?,
                    })
                },
            )?)
        })
    }

    /// Refresh planner statistics and checkpoint the WAL after bulk deletes
    pub fn tidy(&self) -> Result<()> {
        self.read(|conn| {
            conn.execute_batch("PRAGMA optimize; PRAGMA wal_checkpoint(PASSIVE);")?;
            Ok(())
        })
    }

    /// Close the underlying connection
    pub(crate) fn close(self) -> Result<()> {
        let folder_id = self.folder_id;
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| Error::Database(format!("folder {folder_id} connection poisoned")))?;
        conn.close().map_err(|(_, error)| Error::from(error))
    }
}

pub(crate) fn top_sequence(conn: &Connection) -> Result<i64> {
    let seq = conn
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = 'files'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(seq.unwrap_or(0))
}

/// Configure `SQLite` for concurrent readers and short write transactions
pub(crate) fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )?;
    conn.busy_timeout(Duration::from_secs(10))?;
    Ok(())
}

fn device_idx_for(conn: &Connection, device: &DeviceId) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT idx FROM devices WHERE device_id = ?",
            params![device.to_string()],
            |row| row.get(0),
        )
        .optional()?)
}

/// Index of `device`, registering it on first sight
fn ensure_device_idx(tx: &Transaction<'_>, device: &DeviceId) -> Result<i64> {
    if let Some(idx) = device_idx_for(tx, device)? {
        return Ok(idx);
    }

    tx.execute(
        "INSERT INTO devices (device_id) VALUES (?)",
        params![device.to_string()],
    )?;
    Ok(tx.last_insert_rowid())
}

fn local_version(conn: &Connection, local_idx: i64, name: &str) -> Result<Option<VersionVector>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT version FROM files WHERE device_idx = ? AND name = ?",
            params![local_idx, name],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|raw| serde_json::from_str(&raw).map_err(Error::from))
        .transpose()
}
