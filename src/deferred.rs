//! Single-settlement completion handle for queued operations.
//!
//! Every operation pushed into a pump carries a [`Deferred`]. The pump
//! settles it exactly once; callers observe the outcome either by awaiting
//! [`Deferred::wait`] or by attaching callbacks with [`then`](Deferred::then),
//! [`catch`](Deferred::catch) and [`finally`](Deferred::finally).
//!
//! Callbacks attached after settlement still fire: the outcome is recorded
//! and replayed to late observers at attach time.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::SpillwayError;

/// Outcome of a settled deferred.
pub type Settlement<T> = std::result::Result<T, Arc<SpillwayError>>;

type Observer<T> = Box<dyn FnOnce(Settlement<T>) + Send>;

enum Slot<T> {
    Pending(Vec<Observer<T>>),
    Settled(Settlement<T>),
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    settled: watch::Sender<bool>,
}

/// A pending unit of work that settles exactly once.
///
/// Cloning is cheap and every clone observes the same settlement.
pub struct Deferred<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*lock(&self.shared.slot) {
            Slot::Pending(_) => "pending",
            Slot::Settled(Ok(_)) => "resolved",
            Slot::Settled(Err(_)) => "rejected",
        };
        f.debug_struct("Deferred").field("state", &state).finish()
    }
}

impl<T: Clone + Send + 'static> Deferred<T> {
    pub fn new() -> Self {
        let (settled, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::Pending(Vec::new())),
                settled,
            }),
        }
    }

    /// Resolve with `value`. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject with `error`. Returns `false` if already settled.
    pub fn reject(&self, error: impl Into<Arc<SpillwayError>>) -> bool {
        self.settle(Err(error.into()))
    }

    fn settle(&self, outcome: Settlement<T>) -> bool {
        let observers = {
            let mut slot = lock(&self.shared.slot);
            match &mut *slot {
                Slot::Settled(_) => return false,
                Slot::Pending(observers) => {
                    let observers = std::mem::take(observers);
                    *slot = Slot::Settled(outcome.clone());
                    observers
                }
            }
        };
        self.shared.settled.send_replace(true);
        for observer in observers {
            observer(outcome.clone());
        }
        true
    }

    fn observe(&self, observer: Observer<T>) {
        let outcome = {
            let mut slot = lock(&self.shared.slot);
            match &mut *slot {
                Slot::Pending(observers) => {
                    observers.push(observer);
                    return;
                }
                Slot::Settled(outcome) => outcome.clone(),
            }
        };
        observer(outcome);
    }

    /// Attach success and failure callbacks.
    pub fn then<F, E>(&self, on_resolve: F, on_reject: E) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
        E: FnOnce(Arc<SpillwayError>) + Send + 'static,
    {
        self.observe(Box::new(move |outcome| match outcome {
            Ok(value) => on_resolve(value),
            Err(error) => on_reject(error),
        }));
        self
    }

    /// Attach a failure-only callback.
    pub fn catch<E>(&self, on_reject: E) -> &Self
    where
        E: FnOnce(Arc<SpillwayError>) + Send + 'static,
    {
        self.observe(Box::new(move |outcome| {
            if let Err(error) = outcome {
                on_reject(error);
            }
        }));
        self
    }

    /// Attach a callback that fires on either outcome.
    pub fn finally<F>(&self, on_settled: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.observe(Box::new(move |_| on_settled()));
        self
    }

    pub fn is_settled(&self) -> bool {
        matches!(&*lock(&self.shared.slot), Slot::Settled(_))
    }

    /// The recorded outcome, if settled.
    pub fn outcome(&self) -> Option<Settlement<T>> {
        match &*lock(&self.shared.slot) {
            Slot::Pending(_) => None,
            Slot::Settled(outcome) => Some(outcome.clone()),
        }
    }

    /// Wait until settled and return the outcome.
    pub async fn wait(&self) -> Settlement<T> {
        let mut rx = self.shared.settled.subscribe();
        // the sender lives in `shared`, which we hold, so this cannot close
        let _ = rx.wait_for(|settled| *settled).await;
        self.outcome()
            .unwrap_or_else(|| Err(Arc::new(SpillwayError::Canceled)))
    }
}

// Observers run outside the lock, so a poisoned slot still holds a
// consistent value.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
