//! A counter which serializes every request through a single worker task.
//!
//! The worker exclusively owns the [State]. Callers submit timestamps over a
//! bounded queue and wait for the worker's reply, so requests are applied
//! strictly in the order they reach the worker, without a lock around the
//! window.

use crate::join::propagate_panics;
use crate::policy::Policy;
#[cfg(feature = "probes")]
use crate::probes;
use crate::state::{State, Tally, Transition};

use chrono::{DateTime, Utc};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{event, instrument, Level};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Counter terminated")]
    Terminated,

    #[error("Timed out waiting for the counter")]
    Timeout,
}

impl Error {
    #[cfg(feature = "probes")]
    // Convert to a static string for USDT probes.
    const fn as_str(&self) -> &'static str {
        match self {
            Error::Terminated => "Terminated",
            Error::Timeout => "Timeout",
        }
    }
}

enum Request {
    Record {
        at: DateTime<Utc>,
        tx: oneshot::Sender<Tally>,
    },
    Terminate {
        tx: oneshot::Sender<State>,
    },
}

struct CounterInner {
    state: State,
    policy: Policy,
    rx: mpsc::Receiver<Request>,
}

impl CounterInner {
    fn new(state: State, policy: Policy, rx: mpsc::Receiver<Request>) -> Self {
        Self { state, policy, rx }
    }

    async fn run(mut self) {
        loop {
            match self.rx.recv().await {
                Some(Request::Record { at, tx }) => self.record(at, tx),
                // The caller has explicitly asked us to terminate. Anything
                // already queued was submitted before that, so it is still
                // applied before the state is handed back.
                Some(Request::Terminate { tx }) => {
                    self.drain().await;
                    let _ = tx.send(self.state);
                    return;
                }
                // The caller has abandoned the counter, and there is no one
                // left to hand the state to.
                None => {
                    event!(Level::DEBUG, "All counter handles dropped");
                    return;
                }
            }
        }
    }

    fn record(&mut self, at: DateTime<Utc>, tx: oneshot::Sender<Tally>) {
        let (tally, transition) = self.state.record(at, &self.policy);
        match transition {
            Transition::Coalesced => {
                event!(Level::TRACE, total = tally.total, "Coalesced into current bucket");
                #[cfg(feature = "probes")]
                probes::record__coalesced!(|| tally.total);
            }
            Transition::Sealed { evicted } => {
                event!(
                    Level::DEBUG,
                    total = tally.total,
                    evicted,
                    buckets = self.state.window.len(),
                    "Sealed bucket"
                );
                #[cfg(feature = "probes")]
                probes::record__sealed!(|| (tally.total, evicted as u64));
            }
        }
        // The submitter may have stopped waiting; that's fine, the request
        // still counts.
        let _ = tx.send(tally);
    }

    #[instrument(skip(self), name = "CounterInner::drain")]
    async fn drain(&mut self) {
        self.rx.close();
        let mut drained = 0;
        while let Some(request) = self.rx.recv().await {
            match request {
                Request::Record { at, tx } => {
                    self.record(at, tx);
                    drained += 1;
                }
                // Only one terminate request can be answered with the state.
                Request::Terminate { .. } => (),
            }
        }
        event!(Level::DEBUG, drained, "Drained queued requests");
    }
}

/// Counter-side stats.
#[derive(Clone, Default)]
pub struct Stats {
    /// Requests recorded and answered.
    pub recorded: Arc<AtomicUsize>,

    /// Requests whose callers gave up waiting for a reply.
    pub timed_out: Arc<AtomicUsize>,
}

/// Counts requests within a moving window.
pub struct Counter {
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    policy: Policy,
    tx: mpsc::Sender<Request>,
    stats: Stats,
}

impl Counter {
    /// Creates a new counter, starting from `state`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// ```no_run
    /// use slidecount::counter::Counter;
    /// use slidecount::policy::Policy;
    /// use slidecount::state::State;
    ///
    /// # async {
    /// let counter = Counter::new(Policy::default(), State::default());
    /// let tally = counter.record(chrono::Utc::now()).await.unwrap();
    /// assert_eq!(tally.total, 1);
    /// # };
    /// ```
    #[instrument(skip(state), name = "Counter::new")]
    pub fn new(policy: Policy, state: State) -> Self {
        let (tx, rx) = mpsc::channel(policy.queue_depth);
        let policy_clone = policy.clone();
        let handle = tokio::task::spawn(async move {
            let worker = CounterInner::new(state, policy_clone, rx);
            worker.run().await;
        });

        Self {
            handle: Mutex::new(Some(handle)),
            policy,
            tx,
            stats: Stats::default(),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Returns a reference to counter-wide stats
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Records a request at `at`, returning the window total inclusive of it.
    ///
    /// `at` should already be truncated to the policy's precision.
    #[instrument(level = "debug", skip(self), err, name = "Counter::record")]
    pub async fn record(&self, at: DateTime<Utc>) -> Result<Tally, Error> {
        #[cfg(feature = "probes")]
        probes::record__start!(|| at.timestamp_nanos_opt().unwrap_or_default());

        let (tx, rx) = oneshot::channel();
        let exchange = async {
            self.tx
                .send(Request::Record { at, tx })
                .await
                .map_err(|_| Error::Terminated)?;
            rx.await.map_err(|_| Error::Terminated)
        };
        let result = match tokio::time::timeout(self.policy.reply_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                Err(Error::Timeout)
            }
        };

        match &result {
            Ok(_) => {
                self.stats.recorded.fetch_add(1, Ordering::Relaxed);
            }
            Err(_e) => {
                #[cfg(feature = "probes")]
                probes::record__failed!(|| _e.as_str());
            }
        }
        result
    }

    /// Terminates the counter, returning its final state.
    ///
    /// Requests queued before termination are still applied and answered.
    pub async fn terminate(&self) -> Result<State, Error> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Request::Terminate { tx })
            .await
            .map_err(|_| Error::Terminated)?;
        let state = rx.await.map_err(|_| Error::Terminated)?;

        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            propagate_panics(handle.await);
        }
        Ok(state)
    }
}

impl Drop for Counter {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}
