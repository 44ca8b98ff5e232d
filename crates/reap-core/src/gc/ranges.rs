//! Key-space partitioning for chunked collection
//!
//! The shard key's leading [`PREFIX_WIDTH`] bytes span `[0, KEY_SPACE)`. A
//! partition into `n` ranges is contiguous, disjoint and covers the whole
//! space: the first range has no lower bound, the last no upper bound.

use crate::error::{Error, Result};

/// Width in bytes of the key prefix the boundaries are expressed in
pub const PREFIX_WIDTH: usize = 3;

/// Size of the prefix space, `2^(8 * PREFIX_WIDTH)`
pub const KEY_SPACE: u64 = 1 << (8 * PREFIX_WIDTH);

/// One slice of the prefix space, `lower <= prefix < upper`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    pub lower: Option<u32>,
    pub upper: Option<u32>,
}

impl KeyRange {
    /// Render the range as an SQL predicate over a BLOB `column`.
    ///
    /// `SQLite` compares BLOBs bytewise, so a prefix-width literal bounds
    /// longer keys exactly.
    pub fn sql(&self, column: &str) -> String {
        match (self.lower, self.upper) {
            (None, None) => "1".to_string(),
            (None, Some(upper)) => format!("{column} < {}", hex_literal(upper)),
            (Some(lower), None) => format!("{column} >= {}", hex_literal(lower)),
            (Some(lower), Some(upper)) => format!(
                "{column} >= {} AND {column} < {}",
                hex_literal(lower),
                hex_literal(upper)
            ),
        }
    }
}

fn hex_literal(value: u32) -> String {
    format!("x'{value:0width$x}'", width = PREFIX_WIDTH * 2)
}

/// Split the prefix space into `n` ranges.
///
/// Boundary `i` sits at `floor(i * KEY_SPACE / n)`, so boundaries are
/// strictly increasing for every `n` up to `KEY_SPACE`.
pub fn key_ranges(n: usize) -> Result<Vec<KeyRange>> {
    let count = u64::try_from(n).unwrap_or(u64::MAX);
    if count == 0 || count > KEY_SPACE {
        return Err(Error::InvalidInput(format!(
            "key range count must be between 1 and {KEY_SPACE}, got {n}"
        )));
    }

    Ok(partition(count))
}

/// Infallible partition; `count` is clamped into `1..=KEY_SPACE`
pub(crate) fn partition(count: u64) -> Vec<KeyRange> {
    let count = count.clamp(1, KEY_SPACE);

    #[allow(clippy::cast_possible_truncation)]
    let boundary = |i: u64| (i * KEY_SPACE / count) as u32;

    (0..count)
        .map(|i| KeyRange {
            lower: (i > 0).then(|| boundary(i)),
            upper: (i + 1 < count).then(|| boundary(i + 1)),
        })
        .collect()
}
