//! # Expiry Type
//!
//! Expiration durations expressed the way callers think about them
//! (days/hours/minutes/seconds) and converted to the whole-second count the
//! store's `SETEX` expects.
//!
//! ## Design Principles
//!
//! 1. **Unit Record**: Each unit is an independent field; missing units are zero.
//! 2. **Sparse Serialization**: Zero units are omitted, so `600` seconds
//!    decomposes and serializes as `{"minutes": 10}`.
//! 3. **Largest-First Decomposition**: `from_seconds` fills days, then hours,
//!    then minutes, then seconds using floor division.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Seconds per day.
pub const SECS_PER_DAY: u64 = 86_400;
/// Seconds per hour.
pub const SECS_PER_HOUR: u64 = 3_600;
/// Seconds per minute.
pub const SECS_PER_MINUTE: u64 = 60;

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// Expiration duration broken into calendar-free units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expiry {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub days: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub hours: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub minutes: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub seconds: u64,
}

impl Expiry {
    pub fn days(days: u64) -> Self {
        Expiry { days, ..Expiry::default() }
    }

    pub fn hours(hours: u64) -> Self {
        Expiry { hours, ..Expiry::default() }
    }

    pub fn minutes(minutes: u64) -> Self {
        Expiry { minutes, ..Expiry::default() }
    }

    pub fn seconds(seconds: u64) -> Self {
        Expiry { seconds, ..Expiry::default() }
    }

    /// Total duration in seconds: `days*86400 + hours*3600 + minutes*60 + seconds`.
    ///
    /// Saturates instead of overflowing on absurd inputs.
    pub fn total_seconds(&self) -> u64 {
        self.days
            .saturating_mul(SECS_PER_DAY)
            .saturating_add(self.hours.saturating_mul(SECS_PER_HOUR))
            .saturating_add(self.minutes.saturating_mul(SECS_PER_MINUTE))
            .saturating_add(self.seconds)
    }

    /// Like `total_seconds`, but `None` when the sum does not fit in a `u64`.
    pub fn checked_total_seconds(&self) -> Option<u64> {
        self.days
            .checked_mul(SECS_PER_DAY)?
            .checked_add(self.hours.checked_mul(SECS_PER_HOUR)?)?
            .checked_add(self.minutes.checked_mul(SECS_PER_MINUTE)?)?
            .checked_add(self.seconds)
    }

    /// Decomposes a second count into the largest-first unit breakdown.
    ///
    /// # Examples
    /// ```rust
    /// use rkv_common::Expiry;
    ///
    /// assert_eq!(Expiry::from_seconds(600), Expiry::minutes(10));
    /// assert_eq!(Expiry::from_seconds(90_061).total_seconds(), 90_061);
    /// ```
    pub fn from_seconds(total: u64) -> Self {
        let days = total / SECS_PER_DAY;
        let rem = total % SECS_PER_DAY;
        let hours = rem / SECS_PER_HOUR;
        let rem = rem % SECS_PER_HOUR;
        let minutes = rem / SECS_PER_MINUTE;
        let seconds = rem % SECS_PER_MINUTE;
        Expiry {
            days,
            hours,
            minutes,
            seconds,
        }
    }

    /// Returns true when every unit is zero.
    pub fn is_zero(&self) -> bool {
        self.total_seconds() == 0
    }
}

impl From<Expiry> for Duration {
    fn from(expiry: Expiry) -> Self {
        Duration::from_secs(expiry.total_seconds())
    }
}

impl From<Duration> for Expiry {
    /// Sub-second precision is dropped.
    fn from(duration: Duration) -> Self {
        Expiry::from_seconds(duration.as_secs())
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0s");
        }
        let units = [
            (self.days, "d"),
            (self.hours, "h"),
            (self.minutes, "m"),
            (self.seconds, "s"),
        ];
        for (value, suffix) in units {
            if value != 0 {
                write!(f, "{}{}", value, suffix)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_seconds() {
        assert_eq!(Expiry::minutes(10).total_seconds(), 600);
        let mixed = Expiry {
            days: 1,
            hours: 2,
            minutes: 3,
            seconds: 4,
        };
        assert_eq!(mixed.total_seconds(), 86_400 + 7_200 + 180 + 4);
        assert_eq!(Expiry::default().total_seconds(), 0);
    }

    #[test]
    fn test_checked_total_seconds_detects_overflow() {
        assert_eq!(Expiry::hours(1).checked_total_seconds(), Some(3_600));
        assert_eq!(Expiry::days(u64::MAX).checked_total_seconds(), None);
        let near_max = Expiry {
            minutes: 1,
            seconds: u64::MAX - 30,
            ..Expiry::default()
        };
        assert_eq!(near_max.checked_total_seconds(), None);
        assert_eq!(near_max.total_seconds(), u64::MAX);
    }

    #[test]
    fn test_from_seconds_is_sparse() {
        let expiry = Expiry::from_seconds(600);
        assert_eq!(expiry, Expiry::minutes(10));
        assert_eq!(
            serde_json::to_value(expiry).unwrap(),
            serde_json::json!({"minutes": 10})
        );
    }

    #[test]
    fn test_from_seconds_largest_first() {
        let expiry = Expiry::from_seconds(86_400 + 3_600 + 1);
        assert_eq!(expiry.days, 1);
        assert_eq!(expiry.hours, 1);
        assert_eq!(expiry.minutes, 0);
        assert_eq!(expiry.seconds, 1);
        assert_eq!(
            serde_json::to_value(expiry).unwrap(),
            serde_json::json!({"days": 1, "hours": 1, "seconds": 1})
        );
    }

    #[test]
    fn test_missing_units_deserialize_as_zero() {
        let expiry: Expiry = serde_json::from_str(r#"{"hours": 2}"#).unwrap();
        assert_eq!(expiry.total_seconds(), 7_200);
    }

    #[test]
    fn test_saturates() {
        let expiry = Expiry::days(u64::MAX);
        assert_eq!(expiry.total_seconds(), u64::MAX);
    }

    #[test]
    fn test_display() {
        assert_eq!(Expiry::from_seconds(3_725).to_string(), "1h2m5s");
        assert_eq!(Expiry::default().to_string(), "0s");
    }
}
