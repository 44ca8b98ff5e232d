//! Data models for reap

mod device;
mod file;

pub use device::{DeviceId, LOCAL_DEVICE_ID};
pub use file::{name_hash, FileFlags, FileRecord, VersionVector, NAME_HASH_LEN};
