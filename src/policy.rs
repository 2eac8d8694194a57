//! Configuration options which can alter the behavior of the counter.

use crate::precision::Precision;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Precision must be greater than zero")]
    ZeroPrecision,

    #[error("Precision {0:?} is too large")]
    PrecisionTooLarge(Duration),

    #[error("Request queue depth must be greater than zero")]
    ZeroQueueDepth,
}

/// Policy which is applicable to a counter.
#[derive(Clone, Debug)]
pub struct Policy {
    /// The span of time over which the total request count is reported.
    pub window: Duration,

    /// Requests whose timestamps truncate to the same multiple of this value
    /// share a bucket.
    pub precision: Precision,

    /// How long a caller waits for the counter to reply before giving up.
    pub reply_timeout: Duration,

    /// The number of requests which may wait for the counter before callers
    /// are suspended on submission.
    pub queue_depth: usize,
}

impl Policy {
    pub fn new(window: Duration, precision: Duration) -> Result<Self, Error> {
        Ok(Self {
            window,
            precision: Precision::new(precision)?,
            ..Default::default()
        })
    }

    pub fn with_reply_timeout(self, reply_timeout: Duration) -> Self {
        Self {
            reply_timeout,
            ..self
        }
    }

    pub fn with_queue_depth(self, queue_depth: usize) -> Result<Self, Error> {
        if queue_depth == 0 {
            return Err(Error::ZeroQueueDepth);
        }
        Ok(Self {
            queue_depth,
            ..self
        })
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            precision: Precision::new(Duration::from_secs(1))
                .expect("one second is a valid precision"),
            reply_timeout: Duration::from_secs(5),
            queue_depth: 64,
        }
    }
}
