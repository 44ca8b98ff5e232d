//! Tombstone garbage collection

mod collector;
mod ranges;

pub use collector::{CollectOutcome, TombstoneCollector, SHARD_COLUMN};
pub use ranges::{key_ranges, KeyRange, KEY_SPACE, PREFIX_WIDTH};
