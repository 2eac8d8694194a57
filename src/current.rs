//! The bucket under construction for "now".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bucket::Bucket;

/// The bucket still being filled, plus the window total as of when it was
/// opened (including the requests it has absorbed since).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Current {
    // None until the first request is recorded.
    bucket: Option<Bucket>,
    global_total: u64,
}

impl Current {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no request has ever been recorded.
    pub fn is_empty(&self) -> bool {
        self.bucket.is_none()
    }

    /// Initializes an empty cache with a zero-count bucket at `timestamp`.
    ///
    /// Does nothing if the cache is already initialized.
    pub fn open(&mut self, timestamp: DateTime<Utc>) {
        if self.bucket.is_none() {
            self.bucket = Some(Bucket::new(timestamp));
        }
    }

    /// Counts one more request at the current instant.
    pub fn increment_in_place(&mut self) {
        if let Some(bucket) = self.bucket.as_mut() {
            bucket.increment();
            self.global_total += 1;
        }
    }

    /// Replaces the cache with a fresh bucket holding one request.
    pub fn reseal(&mut self, timestamp: DateTime<Utc>, global_total: u64) {
        let mut bucket = Bucket::new(timestamp);
        bucket.increment();
        self.bucket = Some(bucket);
        self.global_total = global_total + 1;
    }

    /// Removes the bucket so it can be sealed into the window.
    pub fn take_bucket(&mut self) -> Option<Bucket> {
        self.bucket.take()
    }

    pub fn bucket(&self) -> Option<&Bucket> {
        self.bucket.as_ref()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.bucket.as_ref().map(|bucket| bucket.timestamp)
    }

    pub fn global_total(&self) -> u64 {
        self.global_total
    }
}
