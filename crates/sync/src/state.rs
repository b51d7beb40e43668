#[cfg(test)]
#[path = "tests/state.rs"]
mod tests;

use std::collections::VecDeque;
use std::time::Instant;

use peerset_primitives::Hash;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::batcher::RecordBatcher;

/// Per-peer sync phase: `Idle → Syncing → Completing → Idle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    #[default]
    Idle,
    Syncing,
    Completing,
}

/// Message and record counters for one peer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub records_sent: u64,
    pub records_received: u64,
}

impl TrafficStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Everything the orchestrator tracks for one peer.
///
/// Exclusively owned by the manager; every armed timer's handle is recorded
/// here so that dropping the state cancels all of them.
#[derive(Debug)]
pub struct PeerState {
    pub phase: SyncPhase,
    pub processing_records: bool,
    pub last_activity: Instant,
    pub sync_started_at: Option<Instant>,
    pub batch_arrival_times: VecDeque<Instant>,
    pub batcher: RecordBatcher,
    pub sync_timeout: Option<JoinHandle<()>>,
    pub completion_check: Option<JoinHandle<()>>,
    pub root_recompute: Option<JoinHandle<()>>,
    pub last_root_sent: Option<Hash>,
    pub records_ingested: u64,
    /// Requests sent whose replies have not arrived yet (subtree or record
    /// requests). A sync is not complete while any are outstanding.
    pub requests_in_flight: u32,
    pub traffic: TrafficStats,
}

impl PeerState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Idle,
            processing_records: false,
            last_activity: Instant::now(),
            sync_started_at: None,
            batch_arrival_times: VecDeque::new(),
            batcher: RecordBatcher::new(),
            sync_timeout: None,
            completion_check: None,
            root_recompute: None,
            last_root_sent: None,
            records_ingested: 0,
            requests_in_flight: 0,
            traffic: TrafficStats::default(),
        }
    }

    /// Record a batch arrival for the adaptive debounce, keeping the last
    /// `history` samples.
    pub fn record_batch_arrival(&mut self, at: Instant, history: usize) {
        self.batch_arrival_times.push_back(at);
        while self.batch_arrival_times.len() > history {
            let _ = self.batch_arrival_times.pop_front();
        }
    }

    /// Abort every armed timer and clear the matching flags.
    pub fn cancel_timers(&mut self) {
        if let Some(handle) = self.sync_timeout.take() {
            handle.abort();
        }
        if let Some(handle) = self.completion_check.take() {
            handle.abort();
        }
        if let Some(handle) = self.root_recompute.take() {
            handle.abort();
        }
        self.batcher.cancel();
    }

    /// Force-cancel a sync: timers and batches go, counters stay.
    pub fn force_idle(&mut self) {
        self.cancel_timers();
        self.phase = SyncPhase::Idle;
        self.processing_records = false;
        self.sync_started_at = None;
        self.records_ingested = 0;
        self.requests_in_flight = 0;
        self.batch_arrival_times.clear();
    }
}

impl Default for PeerState {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PeerState {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}
