//! The count of requests observed at one discretized instant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::precision::Precision;

/// Requests observed at the instant identified by `timestamp`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    #[serde(with = "chrono::serde::ts_nanoseconds")]
    pub timestamp: DateTime<Utc>,

    /// Requests which coalesced into this instant.
    pub count: u64,

    /// Running suffix sum of `count`, from this bucket through the newest
    /// bucket inside the window.
    ///
    /// Only valid immediately after an aggregation sweep reached this bucket.
    pub accumulated: u64,
}

impl Bucket {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            count: 0,
            accumulated: 0,
        }
    }

    pub fn increment(&mut self) {
        self.count += 1;
        self.accumulated += 1;
    }

    /// Returns true if `at` falls into this bucket's instant.
    pub fn coalesces_with(&self, at: DateTime<Utc>, precision: &Precision) -> bool {
        precision.coalesces(self.timestamp, at)
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{timestamp: {}, count: {}, accumulated: {}}}",
            self.timestamp, self.count, self.accumulated
        )
    }
}
