//! Correlation of outstanding requests with their responses.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::WorkerError;

/// Outcome delivered to a waiting request.
pub(crate) type Reply = Result<Value, WorkerError>;

/// Outstanding requests keyed by id.
///
/// Ids start at one, increase strictly and are never reused. Every entry
/// leaves the table exactly once: through [`PendingTable::resolve`],
/// [`PendingTable::cancel`] or [`PendingTable::reject_all`].
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    last_id: u64,
    waiting: HashMap<u64, oneshot::Sender<Reply>>,
}

impl PendingTable {
    /// Allocates the next id and returns it with the receiving half.
    pub(crate) fn register(&mut self) -> (u64, oneshot::Receiver<Reply>) {
        self.last_id = self.last_id.saturating_add(1);
        let (sender, receiver) = oneshot::channel();
        self.waiting.insert(self.last_id, sender);
        (self.last_id, receiver)
    }

    /// Delivers `reply` to request `id`. Returns `false` when the id is not
    /// outstanding, for example a duplicate or a response after a timeout.
    pub(crate) fn resolve(&mut self, id: u64, reply: Reply) -> bool {
        let Some(sender) = self.waiting.remove(&id) else {
            return false;
        };
        // The caller may have given up between the timeout firing and
        // cancelling the entry.
        if sender.send(reply).is_err() {
            return false;
        }
        true
    }

    /// Forgets request `id` without delivering anything.
    pub(crate) fn cancel(&mut self, id: u64) -> bool {
        self.waiting.remove(&id).is_some()
    }

    /// Fails every outstanding request with `error` and returns how many
    /// there were.
    pub(crate) fn reject_all(&mut self, error: &WorkerError) -> usize {
        let drained: Vec<_> = self.waiting.drain().collect();
        let count = drained.len();
        for (_, sender) in drained {
            if sender.send(Err(error.clone())).is_err() {
                continue;
            }
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.waiting.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
