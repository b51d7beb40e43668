//! Per-peer sync orchestration.
//!
//! The manager exclusively owns the per-peer state table. It initiates a
//! sync when a peer announces a differing root, guards against concurrent
//! syncs with the same peer, extends the inactivity timeout while traffic
//! flows, debounces root recomputation after ingestion, and re-announces the
//! root (reverse sync) once it changes.

#[cfg(test)]
#[path = "tests/manager.rs"]
mod tests;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use peerset_merkle::{HashIndex, IndexUpdate, TreeCache};
use peerset_primitives::{Hash, PeerId, Record, RecordId};
use peerset_store::{Database, RecordStore, StoreError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::events::SyncEvent;
use crate::ingest::{approved_subset, sanitize_batch, Moderator};
use crate::protocol;
use crate::state::{PeerState, SyncPhase, TrafficStats};
use crate::transport::{Transport, TransportEvent};
use crate::wire::SyncMessage;

/// The sync engine for one node.
///
/// Cheap to clone; all clones share the same peer table.
#[derive(Debug)]
pub struct SyncManager<D, T, M> {
    inner: Arc<Inner<D, T, M>>,
}

impl<D, T, M> Clone for SyncManager<D, T, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Debug)]
struct Inner<D, T, M> {
    config: SyncConfig,
    transport: T,
    moderator: M,
    records: RecordStore<D>,
    index: Arc<HashIndex>,
    cache: TreeCache,
    peers: Mutex<HashMap<PeerId, PeerState>>,
    subscribers: std::sync::Mutex<Vec<UnboundedSender<SyncEvent>>>,
    weak: Weak<Self>,
}

impl<D, T, M> SyncManager<D, T, M>
where
    D: Database,
    T: Transport,
    M: Moderator,
{
    pub fn new(
        config: SyncConfig,
        transport: T,
        moderator: M,
        records: RecordStore<D>,
        index: Arc<HashIndex>,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak| Inner {
            cache: TreeCache::new(config.merkle_cache_ttl),
            config,
            transport,
            moderator,
            records,
            index,
            peers: Mutex::new(HashMap::new()),
            subscribers: std::sync::Mutex::new(Vec::new()),
            weak: Weak::clone(weak),
        });

        Self { inner }
    }

    /// Receive a copy of every sync event from now on.
    pub fn subscribe(&self) -> UnboundedReceiver<SyncEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// The current local Merkle root (cached build).
    #[must_use]
    pub fn local_root(&self) -> Hash {
        self.inner.cache.get_or_build(&self.inner.index).hash
    }

    /// Dispatch one transport event.
    pub async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::PeerJoined(peer) => self.inner.on_peer_join(peer).await,
            TransportEvent::PeerLeft(peer) => self.inner.on_peer_leave(&peer).await,
            TransportEvent::Message(peer, message) => self.inner.on_message(peer, message).await,
        }
    }

    /// Announce the current root to every peer whose last-seen root differs.
    pub async fn announce_root(&self) {
        self.inner.announce_root().await;
    }

    /// Publish locally produced records.
    ///
    /// Runs the same admission steps as peer ingestion — integrity check,
    /// moderation, atomic persist, hash-index update — then announces the
    /// new root to every peer. Returns how many records were admitted.
    pub async fn add_local_records(&self, records: Vec<Record>) -> Result<usize, StoreError> {
        self.inner.add_local_records(records).await
    }

    /// Per-peer traffic counters.
    pub async fn stats(&self) -> BTreeMap<PeerId, TrafficStats> {
        let peers = self.inner.peers.lock().await;
        peers
            .iter()
            .map(|(peer, state)| (peer.clone(), state.traffic))
            .collect()
    }

    /// Zero all counters. Sync state is untouched.
    pub async fn reset_stats(&self) {
        let mut peers = self.inner.peers.lock().await;
        for state in peers.values_mut() {
            state.traffic.reset();
        }
    }

    /// Current phase for a peer, if known.
    pub async fn phase(&self, peer: &PeerId) -> Option<SyncPhase> {
        let peers = self.inner.peers.lock().await;
        peers.get(peer).map(|state| state.phase)
    }

    /// Whether any peer has outstanding sync work.
    pub async fn is_quiescent(&self) -> bool {
        let peers = self.inner.peers.lock().await;
        peers.values().all(|state| {
            state.phase == SyncPhase::Idle
                && !state.processing_records
                && state.batcher.is_empty()
                && state.requests_in_flight == 0
                && state.root_recompute.is_none()
                && state.completion_check.is_none()
        })
    }
}

impl<D, T, M> Inner<D, T, M>
where
    D: Database,
    T: Transport,
    M: Moderator,
{
    fn emit(&self, event: SyncEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    async fn send_to(&self, state: &mut PeerState, peer: &PeerId, message: SyncMessage) {
        state.traffic.messages_sent += 1;
        state.traffic.records_sent += message.record_count() as u64;

        if matches!(
            message,
            SyncMessage::RequestSubtree { .. } | SyncMessage::RequestRecords { .. }
        ) {
            state.requests_in_flight += 1;
        }

        if let Err(err) = self.transport.send(peer, message).await {
            // Transient by contract: the next root exchange retries.
            warn!(%peer, %err, "transport send failed");
        }
    }

    async fn on_peer_join(&self, peer: PeerId) {
        let root = self.cache.get_or_build(&self.index).hash;

        let mut peers = self.peers.lock().await;
        let state = peers.entry(peer.clone()).or_insert_with(PeerState::new);

        state.last_root_sent = Some(root);
        self.send_to(state, &peer, SyncMessage::RootHash { merkle_root: root })
            .await;

        info!(%peer, %root, "peer joined, announced local root");
    }

    async fn on_peer_leave(&self, peer: &PeerId) {
        let mut peers = self.peers.lock().await;

        // Dropping the state aborts every timer it owns.
        if peers.remove(peer).is_some() {
            info!(%peer, "peer left, discarded sync state");
        }
    }

    async fn on_message(&self, peer: PeerId, message: SyncMessage) {
        {
            let mut peers = self.peers.lock().await;
            let Some(state) = peers.get_mut(&peer) else {
                warn!(%peer, kind = message.kind(), "message from unknown peer dropped");
                return;
            };

            state.traffic.messages_received += 1;
            state.traffic.records_received += message.record_count() as u64;
            state.last_activity = Instant::now();

            if matches!(
                message,
                SyncMessage::SubtreeHashes { .. } | SyncMessage::Records { .. }
            ) {
                state.requests_in_flight = state.requests_in_flight.saturating_sub(1);
            }

            // Inbound traffic is liveness: push the inactivity deadline out.
            if state.sync_timeout.is_some() {
                self.arm_sync_timeout(state, &peer);
            }
        }

        match message {
            SyncMessage::RootHash { merkle_root } => self.on_root_hash(peer, merkle_root).await,
            SyncMessage::RequestSubtree { path, depth } => {
                self.on_request_subtree(peer, &path, depth).await;
            }
            SyncMessage::SubtreeHashes { items } => self.on_subtree_hashes(peer, &items).await,
            SyncMessage::RequestRecords { uuids } => self.on_request_records(peer, &uuids).await,
            SyncMessage::Records { records } => self.on_records(peer, records).await,
        }
    }

    async fn on_root_hash(&self, peer: PeerId, announced: Hash) {
        let local = self.cache.get_or_build(&self.index);

        let mut peers = self.peers.lock().await;
        let Some(state) = peers.get_mut(&peer) else {
            return;
        };

        let Some(request) = protocol::handle_root_hash(&local, announced) else {
            debug!(%peer, root = %announced, "roots match, nothing to reconcile");
            return;
        };

        if state.processing_records || state.phase == SyncPhase::Syncing {
            // Already working this peer; the announcement counted as
            // activity when it was dispatched.
            debug!(%peer, "root differs but sync already in progress");
            return;
        }

        state.phase = SyncPhase::Syncing;
        state.sync_started_at = Some(Instant::now());
        state.records_ingested = 0;
        self.arm_sync_timeout(state, &peer);
        // Covers descents that end up needing nothing: the check finds no
        // outstanding work and returns the peer to idle.
        self.schedule_completion_check(state, &peer);
        self.emit(SyncEvent::started(peer.clone()));

        debug!(%peer, local = %local.hash, remote = %announced, "roots differ, starting descent");

        self.send_to(state, &peer, request).await;
    }

    async fn on_request_subtree(&self, peer: PeerId, path: &str, depth: u32) {
        let local = self.cache.get_or_build(&self.index);

        let Some(reply) = protocol::handle_subtree_request(&local, path, depth) else {
            return;
        };

        let mut peers = self.peers.lock().await;
        if let Some(state) = peers.get_mut(&peer) {
            self.send_to(state, &peer, reply).await;
        }
    }

    async fn on_subtree_hashes(&self, peer: PeerId, items: &[peerset_merkle::SubtreeSummary]) {
        let local = self.cache.get_or_build(&self.index);
        let snapshot = self.index.snapshot();

        let outcome = protocol::handle_subtree_hashes(&local, &snapshot.map, items);

        let mut peers = self.peers.lock().await;
        let Some(state) = peers.get_mut(&peer) else {
            return;
        };

        for request in outcome.requests {
            self.send_to(state, &peer, request).await;
        }

        self.add_needed(state, &peer, outcome.needed).await;
    }

    async fn on_request_records(&self, peer: PeerId, uuids: &[RecordId]) {
        let reply = protocol::handle_record_request(
            |uuid| {
                self.records.get(uuid).unwrap_or_else(|err| {
                    warn!(%uuid, %err, "record lookup failed");
                    None
                })
            },
            uuids,
        );

        let mut peers = self.peers.lock().await;
        if let Some(state) = peers.get_mut(&peer) {
            self.send_to(state, &peer, reply).await;
        }
    }

    /// The ingestion pipeline (records arriving from `peer`).
    async fn on_records(&self, peer: PeerId, records: BTreeMap<RecordId, Record>) {
        {
            let mut peers = self.peers.lock().await;
            let Some(state) = peers.get_mut(&peer) else {
                return;
            };

            state.processing_records = true;
            if state.sync_timeout.is_some() {
                self.arm_sync_timeout(state, &peer);
            }
            state.record_batch_arrival(Instant::now(), self.config.batch_timing_history);
        }

        let records = sanitize_batch(records);
        let verdicts = self.moderator.moderate_batch(&records).await;
        let total = records.len();
        let mut approved = approved_subset(records, &verdicts);

        // A record JSON cannot carry non-finite floats; such a record is
        // malformed and only it is dropped.
        approved.retain(|uuid, record| {
            let ok = record.canonical_bytes().is_ok();
            if !ok {
                warn!(%uuid, "dropping malformed record");
            }
            ok
        });

        if approved.len() < total {
            debug!(
                %peer,
                admitted = approved.len(),
                rejected = total - approved.len(),
                "moderation filtered the batch"
            );
        }

        if let Err(err) = self.records.put_batch(&approved) {
            // Whole-batch persistence failure: abort, clear this peer's sync
            // state, and let the next root exchange retry.
            error!(%peer, %err, "failed to persist record batch");

            let mut peers = self.peers.lock().await;
            if let Some(state) = peers.get_mut(&peer) {
                state.force_idle();
            }
            self.emit(SyncEvent::failed(peer, "persistence failure"));
            return;
        }

        let updates: Vec<IndexUpdate> = approved
            .iter()
            .map(|(uuid, record)| IndexUpdate::Put {
                uuid: uuid.clone(),
                hash: record.integrity.hash,
            })
            .collect();
        self.index.apply(updates);

        let mut peers = self.peers.lock().await;
        let Some(state) = peers.get_mut(&peer) else {
            return;
        };

        state.records_ingested += approved.len() as u64;
        self.schedule_root_recompute(state, &peer);
        self.schedule_completion_check(state, &peer);
        state.processing_records = false;
    }

    async fn add_local_records(&self, records: Vec<Record>) -> Result<usize, StoreError> {
        let mut batch = BTreeMap::new();
        for record in records {
            if !record.verify_integrity() {
                debug!(uuid = %record.uuid, "dropping local record with bad integrity hash");
                continue;
            }
            let _ = batch.insert(record.uuid.clone(), record);
        }

        let verdicts = self.moderator.moderate_batch(&batch).await;
        let approved = approved_subset(batch, &verdicts);

        if approved.is_empty() {
            return Ok(0);
        }

        self.records.put_batch(&approved)?;
        self.index.apply(
            approved
                .iter()
                .map(|(uuid, record)| IndexUpdate::Put {
                    uuid: uuid.clone(),
                    hash: record.integrity.hash,
                })
                .collect(),
        );

        let admitted = approved.len();
        self.announce_root().await;

        Ok(admitted)
    }

    async fn announce_root(&self) {
        let root = self.cache.get_or_build(&self.index).hash;

        let mut peers = self.peers.lock().await;
        let peer_ids: Vec<PeerId> = peers.keys().cloned().collect();

        for peer in peer_ids {
            let Some(state) = peers.get_mut(&peer) else {
                continue;
            };
            if state.last_root_sent == Some(root) {
                continue;
            }
            state.last_root_sent = Some(root);
            self.send_to(state, &peer, SyncMessage::RootHash { merkle_root: root })
                .await;
        }
    }

    // ==================== batching ====================

    async fn add_needed(&self, state: &mut PeerState, peer: &PeerId, needed: Vec<RecordId>) {
        if needed.is_empty() {
            return;
        }

        for uuid in needed {
            if state.batcher.add(uuid, self.config.max_batch_size) {
                self.flush_batch(state, peer).await;
            }
        }

        if !state.batcher.is_empty() {
            self.arm_batch_timer(state, peer);
        }
    }

    async fn flush_batch(&self, state: &mut PeerState, peer: &PeerId) {
        let uuids = state.batcher.take();
        if uuids.is_empty() {
            return;
        }

        debug!(%peer, count = uuids.len(), "requesting records");
        self.send_to(state, peer, SyncMessage::RequestRecords { uuids })
            .await;
    }

    fn arm_batch_timer(&self, state: &mut PeerState, peer: &PeerId) {
        let weak = Weak::clone(&self.weak);
        let peer = peer.clone();
        let delay = self.config.batch_delay;

        state.batcher.arm_timer(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };

            let mut peers = inner.peers.lock().await;
            if let Some(state) = peers.get_mut(&peer) {
                state.batcher.disarm();
                inner.flush_batch(state, &peer).await;
            }
        }));
    }

    // ==================== timers ====================

    fn arm_sync_timeout(&self, state: &mut PeerState, peer: &PeerId) {
        let weak = Weak::clone(&self.weak);
        let peer = peer.clone();
        let timeout = self.config.sync_timeout;

        if let Some(handle) = state.sync_timeout.take() {
            handle.abort();
        }

        state.sync_timeout = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.on_sync_timeout(&peer).await;
        }));
    }

    async fn on_sync_timeout(&self, peer: &PeerId) {
        let mut peers = self.peers.lock().await;
        let Some(state) = peers.get_mut(peer) else {
            return;
        };

        state.sync_timeout = None;
        warn!(%peer, "sync inactivity timeout, force-cancelling");

        // Counters survive; everything else resets.
        state.force_idle();
        self.emit(SyncEvent::failed(peer.clone(), "timeout"));
    }

    fn schedule_root_recompute(&self, state: &mut PeerState, peer: &PeerId) {
        let delay = self.debounce_delay(state);

        if let Some(handle) = state.root_recompute.take() {
            handle.abort();
        }

        let weak = Weak::clone(&self.weak);
        let peer = peer.clone();

        state.root_recompute = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.recompute_root(&peer).await;
        }));
    }

    /// Debounce delay from the peer's batch arrival cadence: twice the mean
    /// inter-arrival interval, clamped to the configured window.
    fn debounce_delay(&self, state: &PeerState) -> Duration {
        let times = &state.batch_arrival_times;

        if times.len() < 2 {
            return self.config.min_merkle_delay;
        }

        let total: Duration = times
            .iter()
            .zip(times.iter().skip(1))
            .map(|(a, b)| b.saturating_duration_since(*a))
            .sum();
        let intervals = times.len() - 1;
        let avg = total / intervals as u32;

        (avg * 2).clamp(self.config.min_merkle_delay, self.config.max_merkle_delay)
    }

    async fn recompute_root(&self, peer: &PeerId) {
        {
            let mut peers = self.peers.lock().await;
            let Some(state) = peers.get_mut(peer) else {
                return;
            };
            state.root_recompute = None;
        }

        // Rebuild outside the peer lock; the cache dedupes with other
        // builders.
        let root = self.cache.get_or_build(&self.index).hash;

        let mut peers = self.peers.lock().await;
        let Some(state) = peers.get_mut(peer) else {
            return;
        };

        if state.last_root_sent != Some(root) {
            debug!(%peer, %root, "root changed after ingestion, reverse sync");
            state.last_root_sent = Some(root);
            self.send_to(state, peer, SyncMessage::RootHash { merkle_root: root })
                .await;
        }
    }

    fn schedule_completion_check(&self, state: &mut PeerState, peer: &PeerId) {
        if let Some(handle) = state.completion_check.take() {
            handle.abort();
        }

        let weak = Weak::clone(&self.weak);
        let peer = peer.clone();
        let delay = self.config.completion_check_delay;

        state.completion_check = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.completion_check(&peer).await;
        }));
    }

    async fn completion_check(&self, peer: &PeerId) {
        let root = self.cache.get_or_build(&self.index).hash;

        let mut peers = self.peers.lock().await;
        let Some(state) = peers.get_mut(peer) else {
            return;
        };

        state.completion_check = None;

        let clean = state.batcher.is_empty()
            && state.root_recompute.is_none()
            && state.requests_in_flight == 0
            && !state.processing_records;

        if !clean {
            debug!(%peer, in_flight = state.requests_in_flight, "sync still has outstanding work, rechecking later");
            if state.phase == SyncPhase::Syncing {
                state.phase = SyncPhase::Completing;
            }
            self.schedule_completion_check(state, peer);
            return;
        }

        if let Some(handle) = state.sync_timeout.take() {
            handle.abort();
        }

        let was_active = state.phase != SyncPhase::Idle;
        state.phase = SyncPhase::Idle;

        if was_active {
            let duration_ms = state
                .sync_started_at
                .take()
                .map_or(0, |started| started.elapsed().as_millis() as u64);
            let ingested = state.records_ingested;
            state.records_ingested = 0;

            info!(%peer, ingested, duration_ms, "sync complete");
            self.emit(SyncEvent::completed(
                peer.clone(),
                Some(ingested),
                duration_ms,
            ));
        }

        // Reverse sync: make sure the peer has seen our latest root so any
        // asymmetry in the other direction gets discovered.
        if state.last_root_sent != Some(root) {
            state.last_root_sent = Some(root);
            self.send_to(state, peer, SyncMessage::RootHash { merkle_root: root })
                .await;
        }
    }
}
