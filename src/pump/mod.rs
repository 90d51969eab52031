//! Bounded concurrent work loop driving streams.
//!
//! A [`Pump`] repeatedly asks a work function for the next unit of work and
//! keeps up to `concurrency` units in flight, multiplexed on the calling
//! task. When nothing is runnable it schedules a short poll delay instead of
//! spinning. The loop ends once the producer reports permanent completion
//! and every in-flight unit has settled; the sink is then driven to
//! `Ended`.
//!
//! # Decision policy
//!
//! Evaluated fresh for every free slot:
//!
//! 1. Pass-through pump and the sink is canceled or ended: done.
//! 2. Sink paused: poll delay.
//! 3. The work function returns a unit: run it.
//! 4. Nothing runnable, source still open: poll delay.
//! 5. Nothing runnable, source ended: done.

mod pagination;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use tracing::{debug, trace};

use crate::deferred::Deferred;
use crate::stream::{Endpoint, StreamState};
use crate::telemetry;
use crate::types::Operation;
use crate::{Result, SpillwayError};

pub use pagination::PageWalker;

/// Default number of units of work in flight.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default delay before re-polling a paused sink or an idle source.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A unit of work run by a pump.
pub type Work = BoxFuture<'static, ()>;

/// Per-invocation pump settings.
///
/// ```rust
/// # use spillway::PumpOptions;
/// # use std::time::Duration;
/// let options = PumpOptions::new()
///     .concurrency(1)
///     .poll_interval(Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpOptions {
    /// Maximum units of work in flight. Default: 10.
    pub concurrency: usize,
    /// Delay used while the sink is paused or the source is idle. Default: 1s.
    pub poll_interval: Duration,
    /// Upper bound on a single store call. Default: none.
    pub call_timeout: Option<Duration>,
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            call_timeout: None,
        }
    }
}

impl PumpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Reject settings that would stall or spin.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(SpillwayError::Configuration(
                "pump concurrency must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(SpillwayError::Configuration(
                "pump poll interval must be non-zero".to_string(),
            ));
        }
        if self.call_timeout.is_some_and(|t| t.is_zero()) {
            return Err(SpillwayError::Configuration(
                "store call timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum PollReason {
    Paused,
    Idle,
}

impl PollReason {
    fn as_str(self) -> &'static str {
        match self {
            PollReason::Paused => "paused",
            PollReason::Idle => "idle",
        }
    }
}

enum Step {
    Run(Work),
    Wait(PollReason),
    Done,
}

/// Bounded concurrent work loop from a source stream into a sink stream.
pub struct Pump<'a> {
    source: &'a dyn Endpoint,
    sink: &'a dyn Endpoint,
    pass_through: bool,
    options: &'a PumpOptions,
}

impl<'a> Pump<'a> {
    /// Pump whose work moves data from `source` into a distinct `sink`.
    ///
    /// Stops early once the sink is canceled or ended.
    pub fn pass_through(
        source: &'a dyn Endpoint,
        sink: &'a dyn Endpoint,
        options: &'a PumpOptions,
    ) -> Self {
        Self {
            source,
            sink,
            pass_through: true,
            options,
        }
    }

    /// Pump whose work consumes `stream` itself.
    pub fn in_place(stream: &'a dyn Endpoint, options: &'a PumpOptions) -> Self {
        Self {
            source: stream,
            sink: stream,
            pass_through: false,
            options,
        }
    }

    fn decide<F>(&self, work: &mut F) -> Step
    where
        F: FnMut() -> Option<Work>,
    {
        let sink = self.sink.state();
        if self.pass_through && matches!(sink, StreamState::Canceled | StreamState::Ended) {
            return Step::Done;
        }
        if sink == StreamState::Paused {
            return Step::Wait(PollReason::Paused);
        }

        // Read before asking for work: anything pushed before the source
        // ended is then visible to `work`.
        let source_ended = self.source.state() == StreamState::Ended;
        if let Some(unit) = work() {
            return Step::Run(unit);
        }
        if source_ended {
            Step::Done
        } else {
            Step::Wait(PollReason::Idle)
        }
    }

    /// Run until the producer is exhausted and all work has settled.
    ///
    /// Fails only on invalid options; failures of individual units are the
    /// units' own business.
    pub async fn run<F>(self, mut work: F) -> Result<()>
    where
        F: FnMut() -> Option<Work> + Send,
    {
        self.options.validate()?;

        let concurrency = self.options.concurrency;
        let mut in_flight: FuturesUnordered<Work> = FuturesUnordered::new();
        let mut exhausted = false;
        let mut dispatched = 0u64;

        loop {
            while !exhausted && in_flight.len() < concurrency {
                match self.decide(&mut work) {
                    Step::Run(unit) => {
                        dispatched += 1;
                        in_flight.push(unit);
                    }
                    Step::Wait(reason) => {
                        trace!(reason = reason.as_str(), "pump waiting");
                        metrics::counter!(telemetry::PUMP_POLLS_TOTAL, "reason" => reason.as_str())
                            .increment(1);
                        in_flight.push(tokio::time::sleep(self.options.poll_interval).boxed());
                    }
                    Step::Done => {
                        debug!(in_flight = in_flight.len(), "pump exhausted, draining");
                        exhausted = true;
                    }
                }
            }
            if in_flight.next().await.is_none() {
                break;
            }
        }

        debug!(dispatched, "pump finished");
        if self.sink.state() != StreamState::Ended {
            self.sink.finish();
        }
        Ok(())
    }
}

/// Await an optional start gate.
pub(crate) async fn pass_gate(endpoint: &dyn Endpoint) {
    if let Some(gate) = endpoint.gate() {
        gate.await;
    }
}

/// Settle one operation's deferred and report a failure on `sink`.
///
/// Returns whether the operation succeeded.
pub(crate) fn settle<V, O>(
    started: Instant,
    outcome: Result<V>,
    deferred: &Deferred<V>,
    operation: O,
    sink: &dyn Endpoint,
) -> bool
where
    V: Clone + Send + 'static,
    O: FnOnce() -> Operation,
{
    let operation = operation();
    let kind = operation.kind();
    metrics::histogram!(telemetry::OPERATION_DURATION_SECONDS, "kind" => kind)
        .record(started.elapsed().as_secs_f64());

    match outcome {
        Ok(value) => {
            metrics::counter!(telemetry::OPERATIONS_TOTAL, "kind" => kind, "status" => "ok")
                .increment(1);
            trace!(operation = %operation.id(), kind, "operation succeeded");
            deferred.resolve(value);
            true
        }
        Err(error) => {
            metrics::counter!(telemetry::OPERATIONS_TOTAL, "kind" => kind, "status" => "error")
                .increment(1);
            debug!(
                operation = %operation.id(),
                kind,
                key = operation.target(),
                error = %error,
                "operation failed"
            );
            let error = Arc::new(error);
            deferred.reject(Arc::clone(&error));
            sink.emit_error(error, Some(operation));
            false
        }
    }
}
