//! Utilities to help with testing slidecount

use crate::server::Clock;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// The instant `secs` seconds after a fixed, arbitrary origin.
pub fn instant(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2006, 1, 2, 19, 0, 0).unwrap() + TimeDelta::seconds(secs)
}

/// A test-only clock which only moves when told to.
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    /// Creates a new clock, stopped at `at`.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            nanos: AtomicI64::new(at.timestamp_nanos_opt().unwrap()),
        }
    }

    /// Moves the clock forward (or backwards, for negative spans).
    pub fn advance(&self, span: TimeDelta) {
        self.nanos
            .fetch_add(span.num_nanoseconds().unwrap(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.nanos.load(Ordering::SeqCst))
    }
}
