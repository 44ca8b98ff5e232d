//! Database layer for reap

mod connection;
mod folder;
mod metadata;
mod migrations;

pub use connection::Database;
pub use folder::{FolderCounts, FolderDb};
pub use metadata::{
    MetadataRepository, TypedMetadata, INTERNAL_META_PREFIX, LAST_SUCCESSFUL_GC_SEQ_KEY,
    LAST_SUCCESSFUL_GC_TIME_KEY,
};
