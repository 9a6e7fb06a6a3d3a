//! Serial numbers with RFC 1982 serial number arithmetic.
//!
//! Serials wrap around at 2^32. `a` is before `b` when `b` can be reached
//! from `a` by adding less than half the number space. Two serials exactly
//! half the space apart are incomparable.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Half of the 32-bit serial number space.
pub const HALF_SERIAL_RANGE: u32 = 1 << 31;

/// A 32-bit wrapping serial number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialNumber(pub u32);

impl SerialNumber {
    /// Serial zero, the initial version of a fresh cache.
    pub const ZERO: Self = Self(0);

    /// Create from the raw value.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// The raw 32-bit value.
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// The next serial, wrapping at 2^32.
    pub const fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// The previous serial, wrapping at 0.
    pub const fn previous(&self) -> Self {
        Self(self.0.wrapping_sub(1))
    }

    /// Number of increments needed to get from `self` to `later`, modulo 2^32.
    pub const fn distance_to(&self, later: SerialNumber) -> u32 {
        later.0.wrapping_sub(self.0)
    }

    /// True if `self` precedes `other` in serial arithmetic.
    pub fn is_before(&self, other: SerialNumber) -> bool {
        let (i1, i2) = (self.0, other.0);
        i1 != i2
            && ((i1 < i2 && i2 - i1 < HALF_SERIAL_RANGE) || (i1 > i2 && i1 - i2 > HALF_SERIAL_RANGE))
    }

    /// True if `self` follows `other` in serial arithmetic.
    pub fn is_after(&self, other: SerialNumber) -> bool {
        let (i1, i2) = (self.0, other.0);
        i1 != i2
            && ((i1 < i2 && i2 - i1 > HALF_SERIAL_RANGE) || (i1 > i2 && i1 - i2 < HALF_SERIAL_RANGE))
    }
}

impl PartialOrd for SerialNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else if self.is_before(*other) {
            Some(Ordering::Less)
        } else if self.is_after(*other) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

impl fmt::Debug for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerialNumber({})", self.0)
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SerialNumber {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
