//! Truncation arithmetic for timestamps and spans.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

use crate::policy::Error;

/// The granularity at which two instants are considered the same instant.
///
/// Always strictly positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Precision {
    nanos: i64,
}

impl Precision {
    pub fn new(duration: Duration) -> Result<Self, Error> {
        let nanos = i64::try_from(duration.as_nanos())
            .map_err(|_| Error::PrecisionTooLarge(duration))?;
        if nanos == 0 {
            return Err(Error::ZeroPrecision);
        }
        Ok(Self { nanos })
    }

    pub fn as_duration(&self) -> Duration {
        // `nanos` is positive, checked on construction.
        Duration::from_nanos(self.nanos.unsigned_abs())
    }

    /// Floors `at` to a multiple of the precision, counted from the Unix
    /// epoch.
    ///
    /// Instants outside the range representable in `i64` nanoseconds (years
    /// 1677 to 2262), or whose floor would fall outside it, are returned
    /// unchanged.
    pub fn truncate(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        at.timestamp_nanos_opt()
            .and_then(|nanos| nanos.checked_sub(nanos.rem_euclid(self.nanos)))
            .map_or(at, DateTime::from_timestamp_nanos)
    }

    /// Returns true if `a` and `b` fall into the same instant.
    pub fn coalesces(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        self.truncate(a) == self.truncate(b)
    }

    /// Truncates a signed span toward zero, in nanoseconds.
    ///
    /// Spans too large for `i64` nanoseconds saturate.
    pub fn truncate_span(&self, span: TimeDelta) -> i64 {
        let nanos = span.num_nanoseconds().unwrap_or(if span < TimeDelta::zero() {
            i64::MIN
        } else {
            i64::MAX
        });
        nanos - nanos % self.nanos
    }

    /// Truncates an unsigned duration, in nanoseconds.
    pub fn truncate_duration(&self, duration: Duration) -> i64 {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        nanos - nanos % self.nanos
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32, nanos: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2006, 1, 2, h, m, s).unwrap() + TimeDelta::nanoseconds(nanos.into())
    }

    #[test]
    fn zero_precision_rejected() {
        assert!(matches!(
            Precision::new(Duration::ZERO).unwrap_err(),
            Error::ZeroPrecision
        ));
        assert!(matches!(
            Precision::new(Duration::MAX).unwrap_err(),
            Error::PrecisionTooLarge(_)
        ));
    }

    #[test]
    fn coalesce_by_second() {
        let p = Precision::new(Duration::from_secs(1)).unwrap();
        assert!(p.coalesces(at(19, 0, 3, 0), at(19, 0, 3, 999_999_999)));
        assert!(!p.coalesces(at(19, 0, 3, 999_999_999), at(19, 0, 4, 0)));
        assert_eq!(p.truncate(at(19, 0, 3, 500_000_000)), at(19, 0, 3, 0));
    }

    #[test]
    fn truncate_before_epoch_floors() {
        let p = Precision::new(Duration::from_secs(1)).unwrap();
        let before = DateTime::from_timestamp_nanos(-1_500_000_000);
        assert_eq!(p.truncate(before), DateTime::from_timestamp_nanos(-2_000_000_000));
    }

    #[test]
    fn truncate_near_minimum_is_unchanged() {
        let p = Precision::new(Duration::from_secs(1)).unwrap();
        let earliest = DateTime::from_timestamp_nanos(i64::MIN);
        assert_eq!(p.truncate(earliest), earliest);
        let almost = DateTime::from_timestamp_nanos(i64::MIN + 1);
        assert_eq!(p.truncate(almost), almost);
        assert!(p.coalesces(almost, almost));
    }

    #[test]
    fn spans_truncate_toward_zero() {
        let p = Precision::new(Duration::from_millis(1)).unwrap();
        assert_eq!(p.truncate_span(TimeDelta::nanoseconds(60_000_999_999)), 60_000_000_000);
        assert_eq!(p.truncate_span(TimeDelta::nanoseconds(-1_500_000)), -1_000_000);
        assert_eq!(p.truncate_duration(Duration::from_nanos(2_500_000)), 2_000_000);
    }
}
