#[cfg(test)]
#[path = "tests/index.rs"]
mod tests;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use peerset_primitives::{Hash, RecordId};

/// One mutation of the hash index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexUpdate {
    Put { uuid: RecordId, hash: Hash },
    Remove { uuid: RecordId },
}

/// A consistent read of the index.
///
/// The map is shared, immutable, and ordered; `version` increments with
/// every applied update batch and keys the tree cache.
#[derive(Clone, Debug)]
pub struct IndexSnapshot {
    pub map: Arc<BTreeMap<RecordId, Hash>>,
    pub version: u64,
}

#[derive(Debug)]
struct Inner {
    snapshot: Arc<BTreeMap<RecordId, Hash>>,
    queue: VecDeque<Vec<IndexUpdate>>,
    draining: bool,
    version: u64,
}

/// The live `uuid → content-hash` map.
///
/// Writes go through a FIFO update queue with a single drain worker: a call
/// to [`apply`](Self::apply) enqueues its batch and, if no drain is active,
/// becomes the worker and applies everything pending to a fresh copy of the
/// snapshot. Concurrent callers enqueue and return; the active worker picks
/// their batches up in arrival order. Readers always see a complete batch or
/// none of it.
#[derive(Debug)]
pub struct HashIndex {
    inner: Mutex<Inner>,
}

impl HashIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                snapshot: Arc::new(BTreeMap::new()),
                queue: VecDeque::new(),
                draining: false,
                version: 0,
            }),
        }
    }

    /// Enqueue a batch of updates and drain the queue unless a drain is
    /// already running.
    pub fn apply(&self, updates: Vec<IndexUpdate>) {
        if updates.is_empty() {
            return;
        }

        {
            let mut inner = self.inner.lock();
            inner.queue.push_back(updates);

            if inner.draining {
                return;
            }
            inner.draining = true;
        }

        loop {
            let (batch, base) = {
                let mut inner = self.inner.lock();
                let Some(batch) = inner.queue.pop_front() else {
                    inner.draining = false;
                    return;
                };
                (batch, Arc::clone(&inner.snapshot))
            };

            let mut next = (*base).clone();
            for update in batch {
                match update {
                    IndexUpdate::Put { uuid, hash } => {
                        let _ = next.insert(uuid, hash);
                    }
                    IndexUpdate::Remove { uuid } => {
                        let _ = next.remove(&uuid);
                    }
                }
            }

            let mut inner = self.inner.lock();
            inner.snapshot = Arc::new(next);
            inner.version += 1;
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> IndexSnapshot {
        let inner = self.inner.lock();
        IndexSnapshot {
            map: Arc::clone(&inner.snapshot),
            version: inner.version,
        }
    }

    #[must_use]
    pub fn contains(&self, uuid: &RecordId) -> bool {
        self.inner.lock().snapshot.contains_key(uuid)
    }

    #[must_use]
    pub fn get(&self, uuid: &RecordId) -> Option<Hash> {
        self.inner.lock().snapshot.get(uuid).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().snapshot.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HashIndex {
    fn default() -> Self {
        Self::new()
    }
}
