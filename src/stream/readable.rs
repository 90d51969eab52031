use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt, stream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use super::buffer::StreamCore;
use super::{Endpoint, Gate, PipeTarget, StreamEvent, StreamOptions, StreamState, forward};
use crate::pump::{Pump, PumpOptions, Work, pass_gate};
use crate::types::Operation;
use crate::{Result, SpillwayError};

/// Emission endpoint with consumer-side flow control.
///
/// Pauses itself once the buffer reaches `max_buffer`; a pump feeding a
/// paused stream polls until [`resume`](Self::resume) or
/// [`cancel`](Self::cancel). Buffered data is never dropped.
pub struct ReadableStream<T, U> {
    core: Arc<StreamCore<T, U>>,
}

impl<T, U> Clone for ReadableStream<T, U> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T, U> ReadableStream<T, U>
where
    T: 'static,
    U: Clone + Send + 'static,
{
    pub fn new(options: StreamOptions<T, U>) -> Self {
        Self {
            core: Arc::new(StreamCore::new(options)),
        }
    }

    /// Transform and produce one item; pauses at the high-water mark.
    ///
    /// Returns `Ok(None)` when the transform filtered the item out or the
    /// stream has ended.
    pub fn push(&self, input: T) -> Result<Option<U>> {
        let Some((output, len)) = self.core.push(input)? else {
            return Ok(None);
        };
        if len >= self.core.max_buffer {
            self.pause();
        }
        Ok(Some(output))
    }

    pub fn pause(&self) {
        if self.core.set_paused(true) {
            debug!(buffered = self.core.len(), "stream paused");
            self.core.emit(StreamEvent::Paused);
        }
    }

    pub fn resume(&self) {
        if self.core.set_paused(false) {
            debug!(buffered = self.core.len(), "stream resumed");
            self.core.emit(StreamEvent::Resumed);
        }
    }

    /// Ask producers to stop. In-flight work still settles.
    pub fn cancel(&self) {
        if self.core.set_canceled() {
            debug!(buffered = self.core.len(), "stream canceled");
            self.core.emit(StreamEvent::Canceled);
        }
    }

    pub fn state(&self) -> StreamState {
        self.core.state()
    }

    pub fn max_buffer(&self) -> usize {
        self.core.max_buffer
    }

    /// Subscribe to lifecycle and error events.
    pub fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.core.events()
    }

    /// Receive produced items directly.
    ///
    /// While at least one receiver is open, items bypass the buffer (and so
    /// never trigger a pause).
    pub fn on_data(&self) -> mpsc::UnboundedReceiver<U> {
        self.core.on_data()
    }

    /// Everything buffered so far, then every later item, as a `Stream`
    /// that ends when this stream ends.
    pub fn into_stream(self) -> Pin<Box<dyn Stream<Item = U> + Send>> {
        let (buffered, rx) = self.core.drain_and_subscribe();
        // drained, so a pump waiting on a full buffer may continue
        self.resume();
        Box::pin(stream::iter(buffered).chain(UnboundedReceiverStream::new(rx)))
    }

    /// Forward everything buffered and every later item into `target`.
    ///
    /// The forwarder runs on a spawned task until this stream ends, then
    /// ends `target` too when `propagate_end` is set. Like
    /// [`into_stream`](Self::into_stream), this empties the buffer and
    /// resumes a paused stream.
    pub fn pipe<S>(&self, target: S, propagate_end: bool) -> JoinHandle<()>
    where
        S: PipeTarget<U> + 'static,
    {
        let (buffered, rx) = self.core.drain_and_subscribe();
        self.resume();
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

    /// Copy of the buffer, oldest first.
    pub fn snapshot(&self) -> Vec<U> {
        self.core.snapshot()
    }

    pub fn pop_front(&self) -> Option<U> {
        self.core.pop_front()
    }

    pub fn pop_back(&self) -> Option<U> {
        self.core.pop_back()
    }

    /// Take the whole buffer, oldest first.
    pub fn drain(&self) -> Vec<U> {
        self.core.drain()
    }

    /// Pump `work` from `from` into this stream, without waiting for gates.
    ///
    /// Stops dispatching once this stream is canceled or ended and ends it
    /// when done.
    pub async fn process<F>(&self, from: &dyn Endpoint, work: F, options: &PumpOptions) -> Result<()>
    where
        F: FnMut() -> Option<Work> + Send,
    {
        Pump::pass_through(from, self, options).run(work).await
    }

    /// Like [`process`](Self::process), but first waits for the source's
    /// gate and then this stream's gate.
    pub async fn process_from<F>(
        &self,
        from: &dyn Endpoint,
        work: F,
        options: &PumpOptions,
    ) -> Result<()>
    where
        F: FnMut() -> Option<Work> + Send,
    {
        options.validate()?;
        pass_gate(from).await;
        pass_gate(self).await;
        Pump::pass_through(from, self, options).run(work).await
    }
}

impl<T, U> PipeTarget<T> for ReadableStream<T, U>
where
    T: 'static,
    U: Clone + Send + 'static,
{
    fn accept(&self, item: T) -> Result<()> {
        self.push(item).map(|_| ())
    }
}

impl<T, U> Endpoint for ReadableStream<T, U>
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_and_cancel_are_ignored_after_end() {
        let stream = ReadableStream::new(StreamOptions::<u32, u32>::new());
        stream.push(1).unwrap();
        stream.finish();

        stream.pause();
        stream.cancel();
        stream.resume();
        assert_eq!(stream.state(), StreamState::Ended);
        assert_eq!(stream.snapshot(), vec![1]);
    }

    #[test]
    fn canceled_wins_over_paused() {
        let stream = ReadableStream::new(StreamOptions::<u32, u32>::new().max_buffer(1));
        stream.push(1).unwrap();
        assert_eq!(stream.state(), StreamState::Paused);
        stream.cancel();
        assert_eq!(stream.state(), StreamState::Canceled);
    }
}
