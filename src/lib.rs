//! slidecount answers "how many requests were seen within the last N
//! seconds?".
//!
//! It uses the following terminology:
//! * A bucket counts the requests seen at one instant, where instants are
//!   timestamps truncated to a configured precision.
//! * The window is the ordered ledger of sealed buckets. Buckets which fall
//!   outside the configured window duration are evicted.
//! * The current bucket is the one still absorbing requests for "now".
//!
//! # Usage
//!
//! * The main interface for this crate is [counter::Counter], which owns the
//!   [state::State] on a dedicated task and serializes every request through
//!   it.
//! * [persistence] saves and restores that state across restarts.
//! * [server] exposes the counter over HTTP.
//!
//! # DTrace probes
//!
//! slidecount contains a number of DTrace USDT probes, which fire as the
//! counter records requests:
//!
//! - `record-start`: Fires before a request is submitted to the counter.
//! - `record-coalesced`: Fires when a request falls into the current bucket.
//! - `record-sealed`: Fires when a request seals the current bucket into the
//!   window, with the number of evicted buckets.
//! - `record-failed`: Fires when a request could not be recorded.
//!
//! The existence of the probes is behind the `"probes"` feature, which is
//! enabled by default. Probes are zero-cost unless they are explicitly enabled,
//! by tracing the program with the `dtrace(1)` command-line tool. They must be
//! registered with `usdt::register_probes()` before they become visible.

// Public API
pub mod bucket;
pub mod counter;
pub mod current;
pub mod persistence;
pub mod policy;
pub mod precision;
pub mod server;
pub mod state;
pub mod window;

// Necessary for implementation
mod join;
#[cfg(test)]
mod test_utils;

/// USDT probes for tracing how slidecount records requests.
#[cfg(feature = "probes")]
#[usdt::provider(provider = "slidecount")]
mod probes {
    /// Fires right before submitting a request to the counter, with the
    /// request's timestamp in nanoseconds since the Unix epoch.
    fn record__start(at_nanos: i64) {}

    /// Fires when a request is counted within the current bucket, with the
    /// resulting window total.
    fn record__coalesced(total: u64) {}

    /// Fires when a request seals the current bucket and opens a new one.
    ///
    /// Also identifies how many buckets fell out of the window.
    fn record__sealed(total: u64, evicted: u64) {}

    /// Fires when a request could not be recorded, with a string identifying
    /// the reason.
    fn record__failed(reason: &str) {}
}
