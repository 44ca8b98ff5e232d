//! Folder metadata repository
//!
//! Namespaced key/value bookkeeping stored in each folder's own database, so
//! it survives restarts and stays next to the rows it describes.

use rusqlite::{params, OptionalExtension};

use super::FolderDb;
use crate::error::{Error, Result};

/// Namespace for bookkeeping owned by reap itself
pub const INTERNAL_META_PREFIX: &str = "reapinternal/";

/// Sequence watermark of the last fully successful tombstone collection
pub const LAST_SUCCESSFUL_GC_SEQ_KEY: &str = "lastSuccessfulGCSeq";

/// Unix seconds of the last fully successful tombstone collection
pub const LAST_SUCCESSFUL_GC_TIME_KEY: &str = "lastSuccessfulGCTime";

/// Trait for typed metadata operations
pub trait MetadataRepository {
    /// Read an integer value, `None` when the key was never set
    fn int64(&self, key: &str) -> Result<Option<i64>>;

    /// Store an integer value, replacing any previous one
    fn set_int64(&self, key: &str, value: i64) -> Result<()>;
}

/// Metadata view over one folder store, scoped to a key prefix
pub struct TypedMetadata<'a> {
    folder: &'a FolderDb,
    prefix: &'a str,
}

impl<'a> TypedMetadata<'a> {
    /// Create a view over `folder` with every key prefixed by `prefix`
    pub const fn new(folder: &'a FolderDb, prefix: &'a str) -> Self {
        Self { folder, prefix }
    }

    /// The reap-internal namespace of `folder`
    pub const fn internal(folder: &'a FolderDb) -> Self {
        Self::new(folder, INTERNAL_META_PREFIX)
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

impl MetadataRepository for TypedMetadata<'_> {
    fn int64(&self, key: &str) -> Result<Option<i64>> {
        let key = self.key(key);
        self.folder.read(|conn| {
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
                    row.get::<_, i64>(0)
                })
                .optional()
                .map_err(|error| match error {
                    rusqlite::Error::InvalidColumnType(..) => {
                        Error::Database(format!("metadata key {key} is not an integer"))
                    }
                    other => other.into(),
                })?;
            Ok(value)
        })
    }

    fn set_int64(&self, key: &str, value: i64) -> Result<()> {
        let key = self.key(key);
        self.folder.transaction(|tx| {
            tx.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)",
                params![key, value],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, FolderDb) {
        let dir = tempfile::tempdir().unwrap();
        let db = FolderDb::open("test", dir.path().join("folder.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_missing_key_is_none() {
        let (_dir, db) = setup();
        let meta = TypedMetadata::internal(&db);
        assert_eq!(meta.int64(LAST_SUCCESSFUL_GC_SEQ_KEY).unwrap(), None);
    }

    #[test]
    fn test_set_and_overwrite() {
        let (_dir, db) = setup();
        let meta = TypedMetadata::internal(&db);

        meta.set_int64(LAST_SUCCESSFUL_GC_SEQ_KEY, 17).unwrap();
        assert_eq!(meta.int64(LAST_SUCCESSFUL_GC_SEQ_KEY).unwrap(), Some(17));

        meta.set_int64(LAST_SUCCESSFUL_GC_SEQ_KEY, 42).unwrap();
        assert_eq!(meta.int64(LAST_SUCCESSFUL_GC_SEQ_KEY).unwrap(), Some(42));
    }

    #[test]
    fn test_prefixes_are_isolated() {
        let (_dir, db) = setup();
        let internal = TypedMetadata::internal(&db);
        let other = TypedMetadata::new(&db, "other/");

        internal.set_int64("k", 1).unwrap();
        other.set_int64("k", 2).unwrap();

        assert_eq!(internal.int64("k").unwrap(), Some(1));
        assert_eq!(other.int64("k").unwrap(), Some(2));
    }
}
