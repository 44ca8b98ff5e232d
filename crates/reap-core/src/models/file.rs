//! File record model

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Number of leading BLAKE3 bytes kept as the shard key for a file name
pub const NAME_HASH_LEN: usize = 8;

/// Stable shard key derived from a file's name.
///
/// Tombstone collection partitions the key space on this value, so chunk
/// sizes stay balanced no matter how deletions cluster in time.
pub fn name_hash(name: &str) -> [u8; NAME_HASH_LEN] {
    let digest = blake3::hash(name.as_bytes());
    let mut out = [0u8; NAME_HASH_LEN];
    out.copy_from_slice(&digest.as_bytes()[..NAME_HASH_LEN]);
    out
}

/// Local bookkeeping flags stored alongside a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileFlags(u32);

impl FileFlags {
    pub const NONE: Self = Self(0);
    /// The local replica has not yet processed a remotely announced change
    pub const LOCAL_NEEDED: Self = Self(1 << 0);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

/// Per-device logical clock. Opaque to garbage collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector {
    pub counters: Vec<Counter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub id: u64,
    pub value: u64,
}

impl VersionVector {
    /// Bump the counter owned by `id`, inserting it if absent
    #[must_use]
    pub fn update(mut self, id: u64) -> Self {
        match self.counters.iter_mut().find(|c| c.id == id) {
            Some(counter) => counter.value += 1,
            None => {
                self.counters.push(Counter { id, value: 1 });
                self.counters.sort_by_key(|c| c.id);
            }
        }
        self
    }
}

/// One device's view of one file in a folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path, unique per device within a folder
    pub name: String,
    pub modified_s: i64,
    pub modified_ns: i32,
    pub version: VersionVector,
    /// Tombstone marker
    pub deleted: bool,
    /// Size in bytes, 0 for tombstones
    pub size: i64,
    pub flags: FileFlags,
    /// Assigned by the store on insert/update; ignored on input
    pub sequence: i64,
}

impl FileRecord {
    /// A live file modified now
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut record = Self {
            name: name.into(),
            modified_s: 0,
            modified_ns: 0,
            version: VersionVector::default().update(1),
            deleted: false,
            size: 0,
            flags: FileFlags::NONE,
            sequence: 0,
        };
        record.set_modified(Utc::now());
        record
    }

    /// A tombstone whose deletion happened at `at`
    #[must_use]
    pub fn tombstone(name: impl Into<String>, at: DateTime<Utc>) -> Self {
        let mut record = Self::new(name);
        record.deleted = true;
        record.set_modified(at);
        record
    }

    #[must_use]
    pub fn with_modified(mut self, at: DateTime<Utc>) -> Self {
        self.set_modified(at);
        self
    }

    #[must_use]
    pub const fn with_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub const fn with_flags(mut self, flags: FileFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn set_modified(&mut self, at: DateTime<Utc>) {
        self.modified_s = at.timestamp();
        #[allow(clippy::cast_possible_wrap)]
        let nanos = at.timestamp_subsec_nanos() as i32;
        self.modified_ns = nanos;
    }

    /// Modification time as a UTC timestamp
    pub fn modified(&self) -> DateTime<Utc> {
        #[allow(clippy::cast_sign_loss)]
        let nanos = self.modified_ns.max(0) as u32;
        Utc.timestamp_opt(self.modified_s, nanos)
            .single()
            .unwrap_or_default()
    }

    /// Modification time in nanoseconds since the Unix epoch, as stored
    pub fn modified_nanos(&self) -> i64 {
        self.modified_s
            .saturating_mul(1_000_000_000)
            .saturating_add(i64::from(self.modified_ns))
    }

    pub fn is_local_needed(&self) -> bool {
        self.flags.contains(FileFlags::LOCAL_NEEDED)
    }
}
