// src/common/address.rs

use super::error::EncodingError;
use core::convert::TryFrom;
use core::fmt;

/// Network address of one LLS sensor on the shared bus (1..=247).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct SensorAddress(u8);

impl SensorAddress {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 247;

    /// Factory setting of a fresh LLS sensor.
    pub const DEFAULT_ADDRESS: SensorAddress = SensorAddress(1);

    /// Creates a new `SensorAddress` if `value` is within `1..=247`.
    pub fn new(value: u8) -> Result<Self, EncodingError> {
        if Self::is_valid(value) {
            Ok(SensorAddress(value))
        } else {
            Err(EncodingError::InvalidAddress(value))
        }
    }

    #[inline]
    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn is_valid(value: u8) -> bool {
        matches!(value, Self::MIN..=Self::MAX)
    }
}

impl Default for SensorAddress {
    fn default() -> Self {
        Self::DEFAULT_ADDRESS
    }
}

impl TryFrom<u8> for SensorAddress {
    type Error = EncodingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SensorAddress> for u8 {
    fn from(value: SensorAddress) -> Self {
        value.0
    }
}

impl fmt::Display for SensorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
