use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::buffer::StreamCore;
use super::{Endpoint, Gate, PipeTarget, StreamEvent, StreamOptions, StreamState, forward};
use crate::pump::{Pump, PumpOptions, Work, pass_gate};
use crate::types::Operation;
use crate::{Result, SpillwayError};

/// Ingestion endpoint: callers push inputs, then [`end`](Self::end) it.
///
/// Never pauses or cancels; its states are `Initializing`, `Readable` and
/// `Ended`.
pub struct WriteableStream<T, U> {
    core: Arc<StreamCore<T, U>>,
}

impl<T, U> Clone for WriteableStream<T, U> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T, U> WriteableStream<T, U>
where
    T: 'static,
    U: Clone + Send + 'static,
{
    pub fn new(options: StreamOptions<T, U>) -> Self {
        Self {
            core: Arc::new(StreamCore::new(options)),
        }
    }

    /// Transform and buffer one input.
    ///
    /// Returns `Ok(None)` when the transform filtered the input out or the
    /// stream has already ended. Transform errors are returned as-is.
    pub fn push(&self, input: T) -> Result<Option<U>> {
        Ok(self.core.push(input)?.map(|(output, _)| output))
    }

    /// Push every input, stopping at the first transform error.
    pub fn extend<I>(&self, inputs: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        for input in inputs {
            self.push(input)?;
        }
        Ok(())
    }

    /// No more input will arrive. Idempotent.
    pub fn end(&self) {
        self.core.finish();
    }

    pub fn state(&self) -> StreamState {
        self.core.state()
    }

    pub fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.core.events()
    }

    /// Receive inputs directly instead of buffering them.
    pub fn on_data(&self) -> mpsc::UnboundedReceiver<U> {
        self.core.on_data()
    }

    /// Forward everything buffered and every later input into `target`,
    /// ending it after this stream ends when `propagate_end` is set.
    pub fn pipe<S>(&self, target: S, propagate_end: bool) -> JoinHandle<()>
    where
        S: PipeTarget<U> + 'static,
    {
        let (buffered, rx) = self.core.drain_and_subscribe();
        forward(buffered, rx, target, propagate_end)
    }

    pub async fn wait_for_end(&self) {
        self.core.wait_for_end().await;
    }

    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.len() == 0
    }

    pub fn snapshot(&self) -> Vec<U> {
        self.core.snapshot()
    }

    pub fn pop_front(&self) -> Option<U> {
        self.core.pop_front()
    }

    pub fn pop_back(&self) -> Option<U> {
        self.core.pop_back()
    }

    pub fn drain(&self) -> Vec<U> {
        self.core.drain()
    }

    /// Pump `work` over this stream's own buffer until it has ended and the
    /// work function runs dry.
    pub async fn process_self<F>(&self, work: F, options: &PumpOptions) -> Result<()>
    where
        F: FnMut() -> Option<Work> + Send,
    {
        options.validate()?;
        pass_gate(self).await;
        Pump::in_place(self, options).run(work).await
    }
}

impl<T, U> PipeTarget<T> for WriteableStream<T, U>
where
    T: 'static,
    U: Clone + Send + 'static,
{
    fn accept(&self, item: T) -> Result<()> {
        self.push(item).map(|_| ())
    }
}

impl<T, U> Endpoint for WriteableStream<T, U>
where
    T: 'static,
    U: Clone + Send + 'static,
{
    fn state(&self) -> StreamState {
        self.core.state()
    }

    fn gate(&self) -> Option<Gate> {
        self.core.gate()
    }

    fn finish(&self) {
        self.core.finish();
    }

    fn emit_error(&self, error: Arc<SpillwayError>, operation: Option<Operation>) {
        self.core.emit_error(error, operation);
    }
}
