//! Buffered, transform-applying streams with flow control.
//!
//! Two endpoint kinds share one core:
//!
//! - [`WriteableStream`] is an ingestion endpoint. Callers push inputs and
//!   call [`end`](WriteableStream::end) when done.
//! - [`ReadableStream`] is an emission endpoint with pause, resume and
//!   cancel tied to a buffer high-water mark.
//!
//! Both run every pushed input through a transform. A transform returning
//! `Ok(None)` filters the item out; `Err` propagates to whoever called
//! `push`.
//!
//! # State machine
//!
//! ```text
//! Initializing --(first item)--> Readable
//! Readable --(buffer >= max_buffer)--> Paused
//! Paused --(resume)--> Readable
//! Readable|Paused --(cancel)--> Canceled
//! any --(end)--> Ended
//! ```
//!
//! `Ended` is terminal. A writeable stream never pauses or cancels.

mod buffer;
mod readable;
mod writeable;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::types::Operation;
use crate::{Result, SpillwayError};

pub use readable::ReadableStream;
pub use writeable::WriteableStream;

/// Default number of buffered items before a readable stream pauses.
pub const DEFAULT_MAX_BUFFER: usize = 50_000;

/// Capacity of each stream's event broadcast.
///
/// Slow event subscribers observe `Lagged` rather than blocking producers.
pub const EVENT_CAPACITY: usize = 1024;

/// Lifecycle state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    Initializing,
    Readable,
    Paused,
    Canceled,
    Ended,
}

impl StreamState {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamState::Initializing => "initializing",
            StreamState::Readable => "readable",
            StreamState::Paused => "paused",
            StreamState::Canceled => "canceled",
            StreamState::Ended => "ended",
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications broadcast by a stream.
///
/// Data items are not broadcast; subscribe with `on_data()` instead.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The first item was produced.
    Readable,
    Paused,
    Resumed,
    Canceled,
    /// No more items will be produced. Sent once.
    End,
    /// An operation failed. The pump keeps going.
    Error {
        error: Arc<SpillwayError>,
        operation: Option<Operation>,
    },
}

/// Fallible item transform applied by `push`.
pub type Transform<T, U> = Arc<dyn Fn(T) -> Result<Option<U>> + Send + Sync>;

/// Precondition that must complete before a pump starts draining a stream.
pub type Gate = Shared<BoxFuture<'static, ()>>;

/// Construction options for a stream.
///
/// ```rust
/// # use spillway::StreamOptions;
/// let options = StreamOptions::with_transform(|line: String| {
///     let line = line.trim().to_string();
///     (!line.is_empty()).then_some(line)
/// })
/// .max_buffer(1_000);
/// ```
pub struct StreamOptions<T, U> {
    pub(crate) transform: Transform<T, U>,
    pub(crate) max_buffer: usize,
    pub(crate) process_after: Option<Gate>,
}

impl<T, U> Clone for StreamOptions<T, U> {
    fn clone(&self) -> Self {
        Self {
            transform: Arc::clone(&self.transform),
            max_buffer: self.max_buffer,
            process_after: self.process_after.clone(),
        }
    }
}

impl<T, U> fmt::Debug for StreamOptions<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("max_buffer", &self.max_buffer)
            .field("process_after", &self.process_after.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: 'static> StreamOptions<T, T> {
    /// Identity transform, default buffer.
    pub fn new() -> Self {
        Self::from_transform(Arc::new(|item| Ok(Some(item))))
    }
}

impl<T: 'static> Default for StreamOptions<T, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, U> StreamOptions<T, U> {
    fn from_transform(transform: Transform<T, U>) -> Self {
        Self {
            transform,
            max_buffer: DEFAULT_MAX_BUFFER,
            process_after: None,
        }
    }

    /// Infallible transform; `None` filters the item out.
    pub fn with_transform<F>(transform: F) -> Self
    where
        F: Fn(T) -> Option<U> + Send + Sync + 'static,
    {
        Self::from_transform(Arc::new(move |item| Ok(transform(item))))
    }

    /// Fallible transform. Errors propagate to the caller of `push`.
    pub fn with_try_transform<F>(transform: F) -> Self
    where
        F: Fn(T) -> Result<Option<U>> + Send + Sync + 'static,
    {
        Self::from_transform(Arc::new(transform))
    }

    /// Buffer length at which a readable stream pauses. Default: 50,000.
    pub fn max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    /// Delay pumping until `gate` completes.
    pub fn process_after<F>(mut self, gate: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.process_after = Some(gate.boxed().shared());
        self
    }
}

/// The view of a stream a pump needs: its state, its start gate, and the
/// ability to end it and report failures on it.
pub trait Endpoint: Send + Sync {
    fn state(&self) -> StreamState;

    /// Gate configured through [`StreamOptions::process_after`].
    fn gate(&self) -> Option<Gate>;

    /// Drive the stream to `Ended`. Idempotent.
    fn finish(&self);

    /// Report an operation failure on the error channel.
    fn emit_error(&self, error: Arc<SpillwayError>, operation: Option<Operation>);
}

/// A stream that accepts items forwarded by `pipe`.
pub trait PipeTarget<T>: Endpoint {
    /// Push one item through this stream's transform.
    fn accept(&self, item: T) -> Result<()>;
}

/// Forward `buffered`, then everything `rx` yields, into `target`.
///
/// Transform errors on the target are reported on its error channel and
/// do not stop the forwarder. `rx` closes when the source ends.
fn forward<U, S>(
    buffered: Vec<U>,
    mut rx: mpsc::UnboundedReceiver<U>,
    target: S,
    propagate_end: bool,
) -> JoinHandle<()>
where
    U: Send + 'static,
    S: PipeTarget<U> + 'static,
{
    tokio::spawn(async move {
        let deliver = |item: U| {
            if let Err(e) = target.accept(item) {
                target.emit_error(Arc::new(e), None);
            }
        };
        let mut forwarded = buffered.len();
        buffered.into_iter().for_each(&deliver);
        while let Some(item) = rx.recv().await {
            forwarded += 1;
            deliver(item);
        }
        trace!(forwarded, propagate_end, "pipe source ended");
        if propagate_end {
            target.finish();
        }
    })
}
