//! Chunked tombstone collector
//!
//! Deletes the local device's expired tombstones one key range at a time.
//! Each range is its own short transaction, so concurrent sync writers are
//! never blocked for longer than one chunk. A pass is chunk-atomic: chunks
//! that committed before an error or cancellation stay committed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::params;
use tokio_util::sync::CancellationToken;

use super::ranges::{key_ranges, partition, KeyRange};
use crate::config::DEFAULT_GC_FANOUT;
use crate::db::FolderDb;
use crate::error::{Error, Result};
use crate::models::{FileFlags, LOCAL_DEVICE_ID};

/// Column the key ranges are evaluated against
pub const SHARD_COLUMN: &str = "name_hash";

/// Result of one collection pass over a folder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectOutcome {
    /// Top sequence of the folder when the pass started
    pub high_sequence: i64,
    /// Rows removed across all chunks
    pub deleted: usize,
}

/// Removes expired tombstones in a fixed number of chunks
#[derive(Debug, Clone)]
pub struct TombstoneCollector {
    ranges: Vec<KeyRange>,
}

impl Default for TombstoneCollector {
    fn default() -> Self {
        Self {
            ranges: partition(DEFAULT_GC_FANOUT as u64),
        }
    }
}

impl TombstoneCollector {
    /// A collector splitting each pass into `fanout` chunks
    pub fn new(fanout: usize) -> Result<Self> {
        Ok(Self {
            ranges: key_ranges(fanout)?,
        })
    }

    /// Delete every local tombstone in `folder` that is older than
    /// `now - retention` and not flagged `LOCAL_NEEDED`.
    ///
    /// A tombstone modified exactly at the cutoff survives. `cancel` is
    /// polled before every chunk; on cancellation the pass stops with
    /// [`Error::Cancelled`].
    pub fn collect(
        &self,
        folder: &FolderDb,
        retention: Duration,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<CollectOutcome> {
        self.collect_chunks(folder, retention, now, cancel, |_, _| {})
    }

    /// Chunk loop behind [`collect`](Self::collect); `after_chunk` sees the
    /// chunk index and its removed row count once that chunk has committed
    fn collect_chunks(
        &self,
        folder: &FolderDb,
        retention: Duration,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
        mut after_chunk: impl FnMut(usize, usize),
    ) -> Result<CollectOutcome> {
        if retention.is_zero() {
            return Err(Error::InvalidInput(
                "tombstone collection requires a non-zero retention".into(),
            ));
        }
        let retention = chrono::Duration::from_std(retention)
            .map_err(|_| Error::InvalidInput(format!("retention {retention:?} out of range")))?;
        // A cutoff before the representable range leaves nothing eligible
        let cutoff = now
            .checked_sub_signed(retention)
            .and_then(|cutoff| cutoff.timestamp_nanos_opt())
            .unwrap_or(i64::MIN);

        // Read up front: rows written while the pass runs keep the folder
        // dirty for the next tick
        let high_sequence = folder.top_sequence()?;
        let local = LOCAL_DEVICE_ID.to_string();
        let needed = FileFlags::LOCAL_NEEDED.bits();

        let mut deleted = 0;
        for (chunk, range) in self.ranges.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!(
                    folder = folder.folder_id(),
                    chunk,
                    deleted,
                    "Tombstone collection cancelled"
                );
                return Err(Error::Cancelled);
            }

            let sql = format!(
                "DELETE FROM files
                 WHERE device_idx = (SELECT idx FROM devices WHERE device_id = ?)
                   AND deleted = 1
                   AND modified < ?
                   AND local_flags & ? = 0
                   AND {}",
                range.sql(SHARD_COLUMN)
            );
            let removed =
                folder.transaction(|tx| Ok(tx.execute(&sql, params![local, cutoff, needed])?))?;

            if removed > 0 {
                tracing::debug!(
                    folder = folder.folder_id(),
                    chunk,
                    removed,
                    "Collected tombstone chunk"
                );
            }
            deleted += removed;
            after_chunk(chunk, removed);
        }

        Ok(CollectOutcome {
            high_sequence,
            deleted,
        })
    }
}
