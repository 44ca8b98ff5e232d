//! Device identity model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

const DEVICE_ID_LEN: usize = 32;

/// Identifies a replica participating in a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId([u8; DEVICE_ID_LEN]);

/// The local replica. Tombstone eligibility is only ever evaluated
/// against records held under this device.
pub const LOCAL_DEVICE_ID: DeviceId = DeviceId([0xff; DEVICE_ID_LEN]);

impl DeviceId {
    /// Build a device ID from raw bytes
    pub const fn from_bytes(bytes: [u8; DEVICE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a device ID whose first byte is `lead` and the rest zero.
    ///
    /// Handy for tests and fixtures that only need distinct remote peers.
    pub const fn from_short(lead: u8) -> Self {
        let mut bytes = [0u8; DEVICE_ID_LEN];
        bytes[0] = lead;
        Self(bytes)
    }

    /// Raw bytes of this ID
    pub const fn as_bytes(&self) -> &[u8; DEVICE_ID_LEN] {
        &self.0
    }

    /// Whether this is the local replica
    pub fn is_local(&self) -> bool {
        *self == LOCAL_DEVICE_ID
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != DEVICE_ID_LEN * 2 || !s.is_ascii() {
            return Err(Error::InvalidInput(format!("invalid device ID: {s}")));
        }

        let mut bytes = [0u8; DEVICE_ID_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| Error::InvalidInput(format!("invalid device ID: {s}")))?;
        }
        Ok(Self(bytes))
    }
}
