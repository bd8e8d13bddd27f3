//! Pending request table shared by the sender and the reply reader.
//!
//! Each outgoing request registers a oneshot resolver under a fresh
//! correlation id. Whoever removes the entry first (reply, timeout, or
//! teardown) resolves it; removal under the lock is what guarantees a
//! request resolves at most once.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use super::Reply;
use crate::error::BridgeError;

/// Result delivered to a waiting sender.
pub type ReplyResult = Result<Reply, BridgeError>;

#[derive(Debug)]
struct Inner {
    next_id: u32,
    entries: HashMap<u32, oneshot::Sender<ReplyResult>>,
    closed: bool,
}

/// Correlation-id → resolver map.
#[derive(Debug)]
pub struct PendingTable {
    inner: Mutex<Inner>,
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingTable {
    /// Empty table; the first id handed out is 1.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                entries: HashMap::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate an id and register a resolver for it.
    ///
    /// Ids increase monotonically, wrap at `u32::MAX`, skip 0, and skip
    /// any id still pending.
    pub fn register(&self) -> Result<(u32, oneshot::Receiver<ReplyResult>), BridgeError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(BridgeError::BackendStopped);
        }

        let mut id = inner.next_id;
        while id == 0 || inner.entries.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        inner.next_id = id.wrapping_add(1);

        let (tx, rx) = oneshot::channel();
        inner.entries.insert(id, tx);
        Ok((id, rx))
    }

    /// Deliver a result to the request with this id.
    ///
    /// Returns `false` if no such request is pending (already resolved,
    /// timed out, or never sent).
    pub fn resolve(&self, id: u32, result: ReplyResult) -> bool {
        let Some(tx) = self.lock().entries.remove(&id) else {
            return false;
        };
        // The waiter may have been dropped; the entry is gone either way.
        let _ = tx.send(result);
        true
    }

    /// Remove an entry without resolving it.
    pub fn cancel(&self, id: u32) -> bool {
        self.lock().entries.remove(&id).is_some()
    }

    /// Reject every pending request and refuse new ones.
    ///
    /// Returns the number of requests rejected.
    pub fn reject_all(&self, error: &BridgeError) -> usize {
        let drained: Vec<_> = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.entries.drain().collect()
        };
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(error.clone()));
        }
        count
    }

    /// Whether [`PendingTable::reject_all`] has run.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of requests awaiting a reply.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no request is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
