//! The sliding-window ledger of sealed buckets.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{event, Level};

use crate::bucket::Bucket;
use crate::precision::Precision;

/// Sealed buckets, ordered from oldest (front) to newest (back).
///
/// Not safe for concurrent use; the counting actor is the only owner.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Window {
    buckets: VecDeque<Bucket>,
}

impl Window {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `bucket` as the newest element.
    ///
    /// Callers are responsible for supplying advancing timestamps.
    pub fn append(&mut self, bucket: Bucket) {
        self.buckets.push_back(bucket);
    }

    /// Recomputes accumulated counts relative to `reference`, evicting every
    /// bucket which fell outside of `window`.
    ///
    /// Walks from the newest bucket to the oldest. Each bucket within the
    /// window accumulates its own count plus the accumulated count of its
    /// newer neighbour. The first bucket outside of the window, and all
    /// buckets older than it, are discarded.
    ///
    /// Returns the number of evicted buckets.
    pub fn aggregate_and_evict(
        &mut self,
        reference: DateTime<Utc>,
        window: Duration,
        precision: &Precision,
    ) -> usize {
        let limit = precision.truncate_duration(window);
        let mut newer_accumulated = 0;

        for index in (0..self.buckets.len()).rev() {
            let bucket = &mut self.buckets[index];
            let age = precision.truncate_span(reference.signed_duration_since(bucket.timestamp));
            if age > limit {
                // Timestamps are monotonic, so everything from here to the
                // front is out of range as well.
                let evicted = index + 1;
                self.buckets.drain(..evicted);
                event!(Level::DEBUG, evicted, remaining = self.buckets.len(), "Evicted buckets");
                return evicted;
            }
            bucket.accumulated = bucket.count + newer_accumulated;
            newer_accumulated = bucket.accumulated;
        }
        0
    }

    /// The total count within the window, as of the last call to
    /// [Self::aggregate_and_evict].
    pub fn total(&self) -> u64 {
        self.buckets.front().map_or(0, |bucket| bucket.accumulated)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Iterates over buckets, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.iter()
    }
}

impl FromIterator<Bucket> for Window {
    fn from_iter<I: IntoIterator<Item = Bucket>>(iter: I) -> Self {
        let mut window = Window::new();
        for bucket in iter {
            window.append(bucket);
        }
        window
    }
}
