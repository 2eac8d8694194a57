//! The counter's authoritative state, and how a single request mutates it.

use chrono::{DateTime, Utc};
use tracing::{event, Level};

use crate::current::Current;
use crate::policy::Policy;
use crate::window::Window;

/// The reply to one recorded request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tally {
    /// The instant of the bucket which absorbed the request.
    pub timestamp: DateTime<Utc>,

    /// Requests within the window, including this one.
    pub total: u64,
}

/// Describes how a request was absorbed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The request fell into the current bucket.
    Coalesced,

    /// The current bucket was sealed into the window, and a new bucket was
    /// opened for the request.
    Sealed { evicted: usize },
}

/// Sealed buckets, plus the bucket under construction.
///
/// This is the unit of persistence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct State {
    pub window: Window,
    pub current: Current,
}

impl State {
    pub fn new(window: Window, current: Current) -> Self {
        Self { window, current }
    }

    /// Records one request at `at`, returning the window total inclusive of
    /// it.
    ///
    /// A request older than the current bucket is counted in the current
    /// bucket, unless the current bucket is more than a window ahead of it
    /// (for example, state restored on a host whose clock is behind the one
    /// which saved it). Then everything recorded so far is discarded and
    /// counting starts over at `at`.
    pub fn record(&mut self, at: DateTime<Utc>, policy: &Policy) -> (Tally, Transition) {
        let precision = &policy.precision;
        self.current.open(at);

        let (timestamp, transition) = match self.current.timestamp() {
            Some(timestamp) if precision.coalesces(timestamp, at) => {
                self.current.increment_in_place();
                (timestamp, Transition::Coalesced)
            }
            Some(timestamp)
                if precision.truncate_span(timestamp.signed_duration_since(at))
                    > precision.truncate_duration(policy.window) =>
            {
                let evicted = self.window.len() + 1;
                event!(
                    Level::WARN,
                    at = %at,
                    current = %timestamp,
                    evicted,
                    "Current bucket is more than a window ahead of the request; starting over"
                );
                self.window = Window::new();
                self.current.reseal(at, 0);
                (at, Transition::Sealed { evicted })
            }
            Some(timestamp) if precision.truncate(at) < precision.truncate(timestamp) => {
                // The clock moved backwards. Counting into the current bucket
                // keeps the window ordered.
                event!(
                    Level::WARN,
                    at = %at,
                    current = %timestamp,
                    "Request timestamp precedes current bucket; counting it in the current bucket"
                );
                self.current.increment_in_place();
                (timestamp, Transition::Coalesced)
            }
            _ => {
                if let Some(sealed) = self.current.take_bucket() {
                    self.window.append(sealed);
                }
                let evicted = self.window.aggregate_and_evict(at, policy.window, precision);
                self.current.reseal(at, self.window.total());
                (at, Transition::Sealed { evicted })
            }
        };

        let tally = Tally {
            timestamp,
            total: self.current.global_total(),
        };
        (tally, transition)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use std::time::Duration;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2006, 1, 2, 19, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn policy(window_secs: u64) -> Policy {
        Policy::new(Duration::from_secs(window_secs), Duration::from_secs(1)).unwrap()
    }

    fn totals(state: &mut State, policy: &Policy, times: &[i64]) -> Vec<u64> {
        times
            .iter()
            .map(|secs| state.record(t(*secs), policy).0.total)
            .collect()
    }

    #[test]
    fn monotonic_total_within_one_bucket() {
        let policy = policy(60);
        let mut state = State::default();
        let times = vec![0; 100];
        let expected: Vec<u64> = (1..=100).collect();
        assert_eq!(expected, totals(&mut state, &policy, &times));
        assert!(state.window.is_empty());
    }

    #[test]
    fn warm_window() {
        let policy = policy(60);
        let mut state = State::default();
        assert_eq!(vec![1, 2, 3, 4], totals(&mut state, &policy, &[0, 0, 1, 1]));
    }

    #[test]
    fn cold_eviction() {
        let policy = policy(1);
        let mut state = State::default();
        assert_eq!(
            vec![1, 2, 2, 2, 2],
            totals(&mut state, &policy, &[0, 1, 2, 3, 4])
        );
        // Only the bucket one second back survives next to the open one.
        assert_eq!(1, state.window.len());
    }

    #[test]
    fn long_gaps_reset() {
        let policy = policy(10);
        let mut state = State::default();
        assert_eq!(
            vec![1, 1, 1, 1],
            totals(&mut state, &policy, &[0, 11, 30, 1000])
        );
    }

    #[test]
    fn sub_second_requests_coalesce() {
        let policy = policy(60);
        let mut state = State::default();
        let base = t(0);
        let (first, transition) = state.record(base, &policy);
        assert_eq!(Transition::Coalesced, transition);
        let (second, transition) = state.record(base + TimeDelta::milliseconds(900), &policy);
        assert_eq!(Transition::Coalesced, transition);
        assert_eq!(1, first.total);
        assert_eq!(2, second.total);
        assert_eq!(base, second.timestamp);
    }

    #[test]
    fn sealing_reports_evictions() {
        let policy = policy(1);
        let mut state = State::default();
        state.record(t(0), &policy);
        let (_, transition) = state.record(t(1), &policy);
        assert_eq!(Transition::Sealed { evicted: 0 }, transition);
        let (_, transition) = state.record(t(5), &policy);
        assert_eq!(Transition::Sealed { evicted: 2 }, transition);
    }

    #[test]
    fn backwards_clock_counts_in_current_bucket() {
        let policy = policy(60);
        let mut state = State::default();
        assert_eq!(vec![1, 2, 3], totals(&mut state, &policy, &[0, 5, 3]));

        let (tally, transition) = state.record(t(2), &policy);
        assert_eq!(Transition::Coalesced, transition);
        assert_eq!(t(5), tally.timestamp);
        assert_eq!(4, tally.total);

        // The window only ever holds monotonic timestamps.
        let timestamps: Vec<_> = state.window.iter().map(|b| b.timestamp).collect();
        assert_eq!(vec![t(0)], timestamps);
    }

    #[test]
    fn current_bucket_far_in_the_future_starts_over() {
        let policy = policy(60);
        let mut state = State::default();
        totals(&mut state, &policy, &[3600, 3600, 3601]);

        // The clock now reads an hour earlier than when the state was built.
        let (tally, transition) = state.record(t(0), &policy);
        assert_eq!(Transition::Sealed { evicted: 2 }, transition);
        assert_eq!(t(0), tally.timestamp);
        assert_eq!(1, tally.total);
        assert!(state.window.is_empty());

        assert_eq!(vec![2, 3], totals(&mut state, &policy, &[0, 1]));
        let timestamps: Vec<_> = state.window.iter().map(|b| b.timestamp).collect();
        assert_eq!(vec![t(0)], timestamps);
    }

    #[test]
    fn current_bucket_exactly_one_window_ahead_is_kept() {
        let policy = policy(60);
        let mut state = State::default();
        totals(&mut state, &policy, &[60]);

        let (tally, transition) = state.record(t(0), &policy);
        assert_eq!(Transition::Coalesced, transition);
        assert_eq!(t(60), tally.timestamp);
        assert_eq!(2, tally.total);
    }

    #[test]
    fn restored_state_evicts_stale_buckets() {
        let policy = policy(60);
        let mut state = State::default();
        totals(&mut state, &policy, &[0, 0, 1]);

        // A long time passes between save and the next request.
        let (tally, _) = state.record(t(3600), &policy);
        assert_eq!(1, tally.total);
        assert!(state.window.is_empty());
    }
}
