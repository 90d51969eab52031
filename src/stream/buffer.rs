use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{trace, warn};

use super::{EVENT_CAPACITY, Gate, StreamEvent, StreamOptions, StreamState, Transform};
use crate::Result;
use crate::SpillwayError;
use crate::types::Operation;

struct Inner<U> {
    buffer: VecDeque<U>,
    subscribers: Vec<mpsc::UnboundedSender<U>>,
    readable: bool,
    paused: bool,
    canceled: bool,
    ended: bool,
}

impl<U> Inner<U> {
    fn state(&self) -> StreamState {
        if self.ended {
            StreamState::Ended
        } else if self.canceled {
            StreamState::Canceled
        } else if self.paused {
            StreamState::Paused
        } else if self.readable {
            StreamState::Readable
        } else {
            StreamState::Initializing
        }
    }
}

/// Buffer, transform and signaling shared by both endpoint kinds.
///
/// The mutex is never held across an await or while user code runs.
pub(super) struct StreamCore<T, U> {
    transform: Transform<T, U>,
    pub(super) max_buffer: usize,
    gate: Option<Gate>,
    inner: Mutex<Inner<U>>,
    events: broadcast::Sender<StreamEvent>,
    state: watch::Sender<StreamState>,
}

impl<T, U: Clone> StreamCore<T, U> {
    pub(super) fn new(options: StreamOptions<T, U>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = watch::channel(StreamState::Initializing);
        Self {
            transform: options.transform,
            max_buffer: options.max_buffer,
            gate: options.process_after,
            inner: Mutex::new(Inner {
                buffer: VecDeque::new(),
                subscribers: Vec::new(),
                readable: false,
                paused: false,
                canceled: false,
                ended: false,
            }),
            events,
            state,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<U>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner<U>) {
        self.state.send_replace(inner.state());
    }

    pub(super) fn emit(&self, event: StreamEvent) {
        // no subscribers is fine for lifecycle events
        let _ = self.events.send(event);
    }

    /// Transform and produce one item. Returns the produced output and the
    /// buffer length after production.
    pub(super) fn push(&self, input: T) -> Result<Option<(U, usize)>> {
        if self.lock().ended {
            trace!("push after end ignored");
            return Ok(None);
        }

        let Some(output) = (self.transform)(input)? else {
            return Ok(None);
        };

        let (became_readable, len) = {
            let mut inner = self.lock();
            if inner.ended {
                trace!("push after end ignored");
                return Ok(None);
            }
            let became_readable = !inner.readable;
            inner.readable = true;

            inner.subscribers.retain(|tx| !tx.is_closed());
            if inner.subscribers.is_empty() {
                inner.buffer.push_back(output.clone());
            } else {
                for tx in &inner.subscribers {
                    let _ = tx.send(output.clone());
                }
            }
            self.publish(&inner);
            (became_readable, inner.buffer.len())
        };

        if became_readable {
            self.emit(StreamEvent::Readable);
        }
        Ok(Some((output, len)))
    }

    pub(super) fn state(&self) -> StreamState {
        self.lock().state()
    }

    pub(super) fn gate(&self) -> Option<Gate> {
        self.gate.clone()
    }

    pub(super) fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    pub(super) fn on_data(&self) -> mpsc::UnboundedReceiver<U> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        // an ended stream hands out a receiver that is already closed
        if !inner.ended {
            inner.subscribers.push(tx);
        }
        rx
    }

    /// Take everything buffered and subscribe to later items in one step,
    /// so nothing produced in between is lost.
    pub(super) fn drain_and_subscribe(&self) -> (Vec<U>, mpsc::UnboundedReceiver<U>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let buffered = inner.buffer.drain(..).collect();
        if !inner.ended {
            inner.subscribers.push(tx);
        }
        (buffered, rx)
    }

    /// Set or clear the paused flag. Returns whether anything changed.
    pub(super) fn set_paused(&self, paused: bool) -> bool {
        let mut inner = self.lock();
        if inner.ended || inner.paused == paused {
            return false;
        }
        inner.paused = paused;
        self.publish(&inner);
        true
    }

    pub(super) fn set_canceled(&self) -> bool {
        let mut inner = self.lock();
        if inner.ended || inner.canceled {
            return false;
        }
        inner.canceled = true;
        self.publish(&inner);
        true
    }

    pub(super) fn finish(&self) {
        {
            let mut inner = self.lock();
            if inner.ended {
                return;
            }
            inner.ended = true;
            // closing the senders ends every data subscription
            inner.subscribers.clear();
            self.publish(&inner);
        }
        self.emit(StreamEvent::End);
    }

    pub(super) fn emit_error(&self, error: Arc<SpillwayError>, operation: Option<Operation>) {
        let event = StreamEvent::Error {
            error: Arc::clone(&error),
            operation: operation.clone(),
        };
        if self.events.send(event).is_err() {
            warn!(
                error = %error,
                operation = ?operation.as_ref().map(Operation::id),
                key = ?operation.as_ref().map(Operation::target),
                "unobserved stream error"
            );
        }
    }

    pub(super) async fn wait_for_end(&self) {
        let mut rx = self.state.subscribe();
        // the sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|state| *state == StreamState::Ended).await;
    }

    pub(super) fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub(super) fn snapshot(&self) -> Vec<U> {
        self.lock().buffer.iter().cloned().collect()
    }

    pub(super) fn pop_front(&self) -> Option<U> {
        self.lock().buffer.pop_front()
    }

    pub(super) fn pop_back(&self) -> Option<U> {
        self.lock().buffer.pop_back()
    }

    pub(super) fn drain(&self) -> Vec<U> {
        self.lock().buffer.drain(..).collect()
    }
}
