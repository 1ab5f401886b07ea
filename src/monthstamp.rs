//! Calendar-month bucket identity for trend aggregates.

use serde::{Deserialize, Serialize};

use time::{OffsetDateTime, UtcOffset};

/// A calendar month encoded as `year * 100 + month` (month 1..=12).
///
/// The integer encoding sorts chronologically, so cutoff comparisons can use
/// the derived ordering directly. Conversions from timestamps are pinned to a
/// single reference offset supplied by the caller (from config, parsed once).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthStamp(u32);

impl MonthStamp {
    /// Bucket for `unix` seconds in the given reference offset. Total:
    /// out-of-range timestamps clamp to the unix epoch.
    pub fn from_timestamp(unix: i64, offset: UtcOffset) -> Self {
        let dt = OffsetDateTime::from_unix_timestamp(unix)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
            .to_offset(offset);
        let year = dt.year().max(0) as u32;
        Self(year * 100 + u8::from(dt.month()) as u32)
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Calendar-month subtraction, carrying across year boundaries.
    pub fn minus_months(self, months: u32) -> Self {
        let total = (self.0 / 100) as i64 * 12 + (self.0 % 100) as i64 - 1 - months as i64;
        let total = total.max(0);
        Self((total / 12) as u32 * 100 + (total % 12) as u32 + 1)
    }
}

impl std::fmt::Display for MonthStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.0 / 100, self.0 % 100)
    }
}
