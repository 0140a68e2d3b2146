//! Time points for timed waits.
//!
//! `XTime` is the `{ sec, nsec }` pair used both as an absolute UTC deadline
//! (`cnd_timedwait`, `mtx_timedlock`) and as a relative duration
//! (`thrd_sleep`). Reading the clock is the ABI layer's job; this module only
//! does the arithmetic.

use std::time::Duration;

use crate::status::{ThrdError, ThrdResult};

/// The only time base `xtime_get` accepts.
pub const TIME_UTC: i32 = 1;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Seconds + nanoseconds. Ordering is chronological for normalized values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct XTime {
    /// Seconds (since the Unix epoch when used as a deadline).
    pub sec: i64,
    /// Nanoseconds, `0..NANOS_PER_SEC` when normalized.
    pub nsec: i64,
}

impl XTime {
    #[must_use]
    pub const fn new(sec: i64, nsec: i64) -> Self {
        Self { sec, nsec }
    }

    /// True when `nsec` lies in `[0, 1e9)`.
    #[must_use]
    pub const fn is_normalized(self) -> bool {
        self.nsec >= 0 && self.nsec < NANOS_PER_SEC
    }

    /// Reject time points the host would refuse with `EINVAL`.
    pub fn validated(self) -> ThrdResult<Self> {
        if self.is_normalized() {
            Ok(self)
        } else {
            Err(ThrdError::InvalidArgument("xtime nanoseconds"))
        }
    }

    /// Build from a non-negative duration (saturating on seconds overflow).
    #[must_use]
    pub fn from_duration(d: Duration) -> Self {
        Self {
            sec: i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
            nsec: i64::from(d.subsec_nanos()),
        }
    }

    /// Interpret as a duration. `None` for negative or unnormalized values.
    #[must_use]
    pub fn to_duration(self) -> Option<Duration> {
        if !self.is_normalized() || self.sec < 0 {
            return None;
        }
        Some(Duration::new(self.sec as u64, self.nsec as u32))
    }

    /// `self + d`, `None` on overflow or if `self` is unnormalized.
    #[must_use]
    pub fn checked_add(self, d: Duration) -> Option<Self> {
        if !self.is_normalized() {
            return None;
        }
        let extra_sec = i64::try_from(d.as_secs()).ok()?;
        let mut sec = self.sec.checked_add(extra_sec)?;
        let mut nsec = self.nsec + i64::from(d.subsec_nanos());
        if nsec >= NANOS_PER_SEC {
            nsec -= NANOS_PER_SEC;
            sec = sec.checked_add(1)?;
        }
        Some(Self { sec, nsec })
    }

    /// True once `now` has reached this deadline.
    #[must_use]
    pub fn has_passed(self, now: Self) -> bool {
        now >= self
    }
}

/// Format a UTC time point as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn format_utc(t: XTime) -> String {
    let mut rem = t.sec % 86_400;
    let mut days = t.sec / 86_400;
    if rem < 0 {
        rem += 86_400;
        days -= 1;
    }
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{:03}Z",
        rem / 3600,
        (rem / 60) % 60,
        rem % 60,
        t.nsec.clamp(0, NANOS_PER_SEC - 1) / 1_000_000,
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
