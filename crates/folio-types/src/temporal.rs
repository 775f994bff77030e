use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Commit creation time in microseconds since the UNIX epoch.
///
/// Timestamps are supplied by whichever device created the commit and are
/// **not** globally ordered: a child commit ingested from another device may
/// carry a smaller timestamp than its parent. They are only meaningful as
/// the first key of the deterministic last-one-wins ordering.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The zero timestamp, used by every page's root commit.
    pub const ZERO: Self = Self(0);

    /// Create a timestamp from raw microseconds.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        Self(micros)
    }

    /// Microseconds since the UNIX epoch.
    pub const fn as_micros(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}us)", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_produces_reasonable_timestamp() {
        // Should be after 2020-01-01 (1577836800000000 us)
        assert!(Timestamp::now().as_micros() > 1_577_836_800_000_000);
    }

    #[test]
    fn zero_is_smallest() {
        assert!(Timestamp::ZERO < Timestamp::from_micros(1));
        assert_eq!(Timestamp::default(), Timestamp::ZERO);
    }

    #[test]
    fn display_is_raw_micros() {
        assert_eq!(format!("{}", Timestamp::from_micros(1500)), "1500");
    }
}
