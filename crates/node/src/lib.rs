//! A peerset node: storage, hash index, sync engine, and key manager wired
//! together behind one handle.
//!
//! The node owns the event-handling surface: the transport delivers
//! join/leave/message events, the node dispatches them into the sync
//! manager, and local publishes go through the same persistence path so the
//! next announced root reflects them.

use std::collections::BTreeMap;
use std::sync::Arc;

use peerset_keys::KeyManager;
use peerset_merkle::{HashIndex, IndexUpdate};
use peerset_primitives::{Hash, PeerId, Record, RecordId};
use peerset_store::{Database, RecordStore, StoreError};
use peerset_sync::{
    Moderator, SyncConfig, SyncEvent, SyncManager, SyncPhase, TrafficStats, Transport,
    TransportEvent,
};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NodeError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One peerset node.
#[derive(Debug)]
pub struct Node<D, T, M> {
    records: RecordStore<D>,
    index: Arc<HashIndex>,
    manager: SyncManager<D, T, M>,
    keys: KeyManager<D>,
}

impl<D, T, M> Node<D, T, M>
where
    D: Database,
    T: Transport,
    M: Moderator,
{
    /// Build a node over a database, seeding the hash index from whatever
    /// records the store already holds.
    pub fn new(
        db: Arc<D>,
        transport: T,
        moderator: M,
        config: SyncConfig,
    ) -> Result<Self, NodeError> {
        let records = RecordStore::new(Arc::clone(&db));
        let index = Arc::new(HashIndex::new());

        let existing = records.get_all()?;
        if !existing.is_empty() {
            debug!(count = existing.len(), "seeding hash index from store");
            index.apply(
                existing
                    .iter()
                    .map(|(uuid, record)| IndexUpdate::Put {
                        uuid: uuid.clone(),
                        hash: record.integrity.hash,
                    })
                    .collect(),
            );
        }

        let manager = SyncManager::new(
            config,
            transport,
            moderator,
            records.clone(),
            Arc::clone(&index),
        );

        Ok(Self {
            records,
            index,
            manager,
            keys: KeyManager::new(db),
        })
    }

    /// Dispatch one transport event into the sync engine.
    pub async fn handle_event(&self, event: TransportEvent) {
        self.manager.handle_event(event).await;
    }

    /// Publish locally produced records.
    ///
    /// Local publishes share the peer-ingestion admission steps: records
    /// failing their own integrity hash are dropped, the moderator rules on
    /// the batch, and the admitted subset is persisted and indexed before
    /// the new root is announced to every peer. Returns how many records
    /// were admitted.
    pub async fn add_records(&self, records: Vec<Record>) -> Result<usize, NodeError> {
        Ok(self.manager.add_local_records(records).await?)
    }

    /// The current Merkle root over the local record set.
    #[must_use]
    pub fn root_hash(&self) -> Hash {
        self.manager.local_root()
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.index.len()
    }

    pub fn records(&self) -> Result<BTreeMap<RecordId, Record>, NodeError> {
        Ok(self.records.get_all()?)
    }

    /// Sync events (started / completed / failed) for observers.
    pub fn subscribe(&self) -> UnboundedReceiver<SyncEvent> {
        self.manager.subscribe()
    }

    pub async fn stats(&self) -> BTreeMap<PeerId, TrafficStats> {
        self.manager.stats().await
    }

    pub async fn reset_stats(&self) {
        self.manager.reset_stats().await;
    }

    pub async fn phase(&self, peer: &PeerId) -> Option<SyncPhase> {
        self.manager.phase(peer).await
    }

    /// Whether no peer has outstanding sync work.
    pub async fn is_quiescent(&self) -> bool {
        self.manager.is_quiescent().await
    }

    /// The login/key-management surface. Not wired into sync; records are
    /// admitted on their own signatures regardless of the local session.
    #[must_use]
    pub fn keys(&self) -> &KeyManager<D> {
        &self.keys
    }
}
