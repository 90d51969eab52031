//! Continuation-token bookkeeping for paginated listings.
//!
//! Remote listings arrive in pages, each carrying an opaque token for the
//! next one. Tokens cannot be computed client-side, so completion is only
//! knowable by counting listings that may still produce another page. That
//! count is the walker's `outstanding` work counter; an empty queue alone
//! means nothing, since a fetch in flight may re-queue its listing.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::SpillwayError;
use crate::types::{ContinuationToken, ListOperation, OperationId};

struct Cursor {
    operation: ListOperation,
    token: Option<ContinuationToken>,
}

#[derive(Default)]
struct WalkState {
    /// Drained from the back: the most recently queued listing goes first.
    queue: Vec<OperationId>,
    cursors: HashMap<OperationId, Cursor>,
    /// Every id ever seeded; a listing is walked at most once per walker.
    seen: HashSet<OperationId>,
    outstanding: usize,
}

/// Work queue and cursor arena for one listing pump.
///
/// Each listing keeps its identity (and deferred) while its cursor advances.
/// The queue is LIFO, which finishes one prefix's pagination before moving
/// on to listings seeded earlier.
#[derive(Default)]
pub struct PageWalker {
    state: Mutex<WalkState>,
}

impl PageWalker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WalkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a new listing starting at its first page.
    ///
    /// Returns `false`, leaving the walker untouched, when this listing was
    /// already seeded. Its deferred is shared with the tracked copy, which
    /// settles it.
    pub fn seed(&self, operation: ListOperation) -> bool {
        let mut state = self.lock();
        let id = operation.id();
        if !state.seen.insert(id) {
            trace!(operation = %id, "duplicate listing ignored");
            return false;
        }
        trace!(operation = %id, prefix = ?operation.prefix(), "listing seeded");
        state.cursors.insert(
            id,
            Cursor {
                operation,
                token: None,
            },
        );
        state.queue.push(id);
        state.outstanding += 1;
        true
    }

    /// Pop the most recently queued listing with its current cursor.
    pub fn next(&self) -> Option<(ListOperation, Option<ContinuationToken>)> {
        let mut state = self.lock();
        while let Some(id) = state.queue.pop() {
            if let Some(cursor) = state.cursors.get(&id) {
                return Some((cursor.operation.clone(), cursor.token.clone()));
            }
        }
        None
    }

    /// Record the next page's token and re-queue the listing.
    ///
    /// The work counter is untouched: the listing never stopped being
    /// outstanding.
    pub fn advance(&self, id: OperationId, token: ContinuationToken) {
        let mut state = self.lock();
        if let Some(cursor) = state.cursors.get_mut(&id) {
            cursor.token = Some(token);
            state.queue.push(id);
        }
    }

    /// Retire a listing that reached its last page or failed.
    pub fn complete(&self, id: OperationId) {
        let mut state = self.lock();
        if state.cursors.remove(&id).is_some() {
            state.outstanding -= 1;
        }
    }

    /// Listings that may still produce another page.
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// Listings waiting for their next fetch.
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Reject every listing still tracked, e.g. after the consumer canceled.
    ///
    /// Returns how many listings were abandoned.
    pub fn abandon(&self) -> usize {
        let cursors: Vec<Cursor> = {
            let mut state = self.lock();
            state.queue.clear();
            state.outstanding = 0;
            state.cursors.drain().map(|(_, cursor)| cursor).collect()
        };
        let error = Arc::new(SpillwayError::Canceled);
        for cursor in &cursors {
            cursor.operation.deferred().reject(Arc::clone(&error));
        }
        cursors.len()
    }
}
