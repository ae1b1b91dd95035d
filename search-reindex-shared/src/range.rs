//! Keyspace partitioning.
//!
//! Ranges are half-open `[lower, upper)` over fixed-width lowercase hex
//! strings. The last identifier range ends at the all-`f` value, which is
//! treated as inclusive by readers (see [`RangeBound::is_open_ended`]).

use serde::{Deserialize, Serialize};

use crate::error::RangeError;

/// Number of hex characters in a 128-bit identifier.
pub const IDENTIFIER_WIDTH: usize = 32;

/// Marks "no upper bound" in the hex-space catch-all range.
pub const HEX_SENTINEL: char = 'x';

/// An immutable `(lower, upper)` pair produced by the partitioner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeBound {
    pub lower: String,
    pub upper: String,
}

impl RangeBound {
    fn new(lower: String, upper: String) -> Self {
        Self { lower, upper }
    }

    /// Returns true if the upper bound is the maximum of its space, meaning
    /// every key at or above the lower bound belongs to this range.
    pub fn is_open_ended(&self) -> bool {
        self.upper.starts_with(HEX_SENTINEL)
            || (self.upper.len() == IDENTIFIER_WIDTH && self.upper.chars().all(|c| c == 'f'))
    }

    /// Returns true if `key` (same alphabet as the bounds) falls inside this range.
    pub fn contains(&self, key: &str) -> bool {
        key >= self.lower.as_str() && (self.is_open_ended() || key < self.upper.as_str())
    }
}

/// Divide the 128-bit identifier space into `count` equal-width ranges.
///
/// Returns an empty vector for `count <= 0`. Otherwise the first lower bound
/// is all zeros, the last upper bound is all `f`, and every range's upper
/// bound equals the next range's lower bound.
pub fn partition_identifier_space(count: i64) -> Vec<RangeBound> {
    if count <= 0 {
        return Vec::new();
    }

    let count = count as u128;
    let step = u128::MAX / count;

    (0..count)
        .map(|i| {
            let lower = step * i;
            let upper = if i + 1 == count { u128::MAX } else { step * (i + 1) };
            RangeBound::new(format_identifier(lower), format_identifier(upper))
        })
        .collect()
}

/// The single range spanning the whole identifier space.
pub fn empty_range() -> RangeBound {
    RangeBound::new(format_identifier(0), format_identifier(u128::MAX))
}

/// Enumerate every `length`-digit hex boundary at single-increment granularity,
/// followed by the catch-all range `(f…f, x…x)`.
///
/// For `length = 2` this yields 256 ranges: `("00","01") .. ("fe","ff")` and
/// `("ff","xx")`.
pub fn partition_hex_space(length: usize) -> Result<Vec<RangeBound>, RangeError> {
    if length < 1 {
        return Err(RangeError::invalid_argument(format!(
            "Hex range length must be at least 1, got {}",
            length
        )));
    }
    if length > 8 {
        return Err(RangeError::invalid_argument(format!(
            "Hex range length must be at most 8, got {}",
            length
        )));
    }

    let max = 16u64.pow(length as u32) - 1;
    let format = |value: u64| format!("{:0width$x}", value, width = length);

    let mut ranges: Vec<RangeBound> = (0..max)
        .map(|value| RangeBound::new(format(value), format(value + 1)))
        .collect();
    ranges.push(RangeBound::new(
        format(max),
        HEX_SENTINEL.to_string().repeat(length),
    ));

    Ok(ranges)
}

fn format_identifier(value: u128) -> String {
    format!("{:0width$x}", value, width = IDENTIFIER_WIDTH)
}
