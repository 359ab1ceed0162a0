//! Response time values.
//!
//! Response times are millisecond-scaled, non-negative integers. The same
//! unit is used for observed averages, edge values and published results.

use serde::{Deserialize, Serialize};

/// Response time in milliseconds
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ResponseTime(u64);

impl ResponseTime {
    /// Zero response time
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Create from milliseconds
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Get as milliseconds
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Check if zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Saturating addition
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating multiplication by a call count
    #[must_use]
    pub const fn saturating_mul(self, times: u32) -> Self {
        Self(self.0.saturating_mul(times as u64))
    }

    /// Average of a summed value over `count` samples; zero when there are none
    #[must_use]
    pub const fn average(sum: Self, count: u64) -> Self {
        if count == 0 {
            Self(0)
        } else {
            Self(sum.0 / count)
        }
    }
}

impl std::fmt::Display for ResponseTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl From<u64> for ResponseTime {
    fn from(millis: u64) -> Self {
        Self(millis)
    }
}

impl From<std::time::Duration> for ResponseTime {
    fn from(duration: std::time::Duration) -> Self {
        Self(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

impl std::iter::Sum for ResponseTime {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Self::saturating_add)
    }
}
