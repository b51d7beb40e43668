#[cfg(test)]
#[path = "tests/batcher.rs"]
mod tests;

use std::collections::BTreeSet;

use peerset_primitives::RecordId;
use tokio::task::JoinHandle;

/// Per-peer accumulator of record identifiers we still need.
///
/// Additions dedupe. The owner flushes when [`add`](Self::add) reports the
/// size threshold was reached, and otherwise arms a delay timer whose handle
/// lives here so cancellation tears it down with the rest of the peer state.
#[derive(Debug, Default)]
pub struct RecordBatcher {
    pending: BTreeSet<RecordId>,
    timer: Option<JoinHandle<()>>,
}

impl RecordBatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one needed uuid. Returns `true` once the accumulator has reached
    /// `max_batch_size` and must be flushed immediately.
    pub fn add(&mut self, uuid: RecordId, max_batch_size: usize) -> bool {
        let _ = self.pending.insert(uuid);
        self.pending.len() >= max_batch_size
    }

    /// Take everything pending, clearing the timer.
    ///
    /// The flush invariant (`1 ≤ len ≤ max_batch_size`) holds because the
    /// owner flushes exactly at the threshold and the timer only ever fires
    /// on a non-empty accumulator.
    pub fn take(&mut self) -> Vec<RecordId> {
        self.clear_timer();
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// Drop everything without sending. Used on peer leave and cancellation.
    pub fn cancel(&mut self) {
        self.clear_timer();
        self.pending.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Replace the armed flush timer, aborting any previous one.
    pub fn arm_timer(&mut self, handle: JoinHandle<()>) {
        self.clear_timer();
        self.timer = Some(handle);
    }

    pub fn clear_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Drop the timer handle without aborting. Called from inside the fired
    /// timer task, which must not cancel itself mid-flush.
    pub fn disarm(&mut self) {
        let _ = self.timer.take();
    }

    #[must_use]
    pub fn timer_armed(&self) -> bool {
        self.timer.is_some()
    }
}

impl Drop for RecordBatcher {
    fn drop(&mut self) {
        self.clear_timer();
    }
}
