//! In-memory room transport and node fixtures for convergence testing.
//!
//! The room plays the part of the real multi-peer channel: registered nodes
//! get a FIFO event queue, joins and leaves fan out membership events, and
//! every directed send lands in the target's queue in order. A transcript of
//! every delivered message backs the traffic assertions in the scenarios.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use peerset_crypto::{xonly_public_key, SecretKey};
use peerset_keys::signer::sign_record;
use peerset_node::Node;
use peerset_primitives::{Author, Content, Geo, Hash, Integrity, PeerId, Record, RecordId};
use peerset_store::InMemoryDB;
use peerset_sync::{
    Moderator, SyncConfig, SyncMessage, Transport, TransportError, TransportEvent,
};

// ============================================================
// Room
// ============================================================

/// One delivered protocol message, for traffic assertions.
#[derive(Clone, Debug)]
pub struct SentMessage {
    pub from: PeerId,
    pub to: PeerId,
    pub kind: &'static str,
    pub records: usize,
    pub uuids: usize,
}

#[derive(Debug, Default)]
struct RoomInner {
    queues: HashMap<PeerId, VecDeque<TransportEvent>>,
    announced: Vec<PeerId>,
    transcript: Vec<SentMessage>,
}

/// An in-memory multi-peer channel with ordered delivery.
#[derive(Clone, Debug, Default)]
pub struct Room {
    inner: Arc<Mutex<RoomInner>>,
}

impl Room {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RoomInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the peer's queue without announcing membership yet.
    pub fn register(&self, id: &str) -> RoomHandle {
        let peer = PeerId::from(id);
        let _ = self.lock().queues.entry(peer.clone()).or_default();

        RoomHandle {
            room: self.clone(),
            self_id: peer,
        }
    }

    /// Announce a registered peer to the room: already-announced members
    /// learn about it and it learns about them.
    pub fn announce(&self, id: &str) {
        let joiner = PeerId::from(id);
        let mut inner = self.lock();

        let others = inner.announced.clone();

        for other in &others {
            if let Some(queue) = inner.queues.get_mut(other) {
                queue.push_back(TransportEvent::PeerJoined(joiner.clone()));
            }
        }
        if let Some(queue) = inner.queues.get_mut(&joiner) {
            for other in others {
                queue.push_back(TransportEvent::PeerJoined(other));
            }
        }

        inner.announced.push(joiner);
    }

    /// Remove a peer; everyone remaining hears about it.
    pub fn leave(&self, id: &str) {
        let leaver = PeerId::from(id);
        let mut inner = self.lock();

        let _ = inner.queues.remove(&leaver);
        inner.announced.retain(|peer| *peer != leaver);
        for member in inner.announced.clone() {
            if let Some(queue) = inner.queues.get_mut(&member) {
                queue.push_back(TransportEvent::PeerLeft(leaver.clone()));
            }
        }
    }

    pub fn poll(&self, id: &PeerId) -> Option<TransportEvent> {
        self.lock().queues.get_mut(id)?.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        self.lock().queues.values().any(|queue| !queue.is_empty())
    }

    pub fn transcript(&self) -> Vec<SentMessage> {
        self.lock().transcript.clone()
    }

    pub fn clear_transcript(&self) {
        self.lock().transcript.clear();
    }

    /// Count of delivered messages of one kind.
    pub fn count_kind(&self, kind: &str) -> usize {
        self.lock()
            .transcript
            .iter()
            .filter(|message| message.kind == kind)
            .count()
    }

    fn deliver(&self, from: &PeerId, to: &PeerId, message: SyncMessage) -> bool {
        let mut inner = self.lock();

        let uuids = match &message {
            SyncMessage::RequestRecords { uuids } => uuids.len(),
            _ => 0,
        };
        inner.transcript.push(SentMessage {
            from: from.clone(),
            to: to.clone(),
            kind: message.kind(),
            records: message.record_count(),
            uuids,
        });

        match inner.queues.get_mut(to) {
            Some(queue) => {
                queue.push_back(TransportEvent::Message(from.clone(), message));
                true
            }
            None => false,
        }
    }
}

/// One peer's handle into the room.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    room: Room,
    self_id: PeerId,
}

#[async_trait]
impl Transport for RoomHandle {
    async fn send(&self, peer: &PeerId, message: SyncMessage) -> Result<(), TransportError> {
        if self.room.deliver(&self.self_id, peer, message) {
            Ok(())
        } else {
            Err(TransportError::Unreachable(peer.clone()))
        }
    }

    async fn broadcast(&self, message: SyncMessage) -> Result<(), TransportError> {
        let peers: Vec<PeerId> = {
            let inner = self.room.lock();
            inner
                .queues
                .keys()
                .filter(|peer| **peer != self.self_id)
                .cloned()
                .collect()
        };

        for peer in peers {
            let _ = self.room.deliver(&self.self_id, &peer, message.clone());
        }

        Ok(())
    }
}

// ============================================================
// Nodes
// ============================================================

/// Moderator with a configurable reject list; empty = admit everything.
#[derive(Clone, Debug, Default)]
pub struct TestModerator {
    reject: Vec<RecordId>,
}

impl TestModerator {
    pub fn rejecting(uuids: &[&str]) -> Self {
        Self {
            reject: uuids.iter().map(|uuid| RecordId::from(*uuid)).collect(),
        }
    }
}

#[async_trait]
impl Moderator for TestModerator {
    async fn moderate_batch(
        &self,
        records: &BTreeMap<RecordId, Record>,
    ) -> BTreeMap<RecordId, bool> {
        records
            .keys()
            .map(|uuid| (uuid.clone(), !self.reject.contains(uuid)))
            .collect()
    }
}

pub type TestNode = Node<InMemoryDB, RoomHandle, TestModerator>;

/// Build a node registered in the room (membership not yet announced).
pub fn node_in(room: &Room, id: &str, moderator: TestModerator) -> TestNode {
    let handle = room.register(id);
    Node::new(
        Arc::new(InMemoryDB::new()),
        handle,
        moderator,
        SyncConfig::default(),
    )
    .expect("empty store cannot fail to load")
}

/// A properly signed test record keyed by uuid. All fixtures share one
/// deterministic author key.
pub fn record(uuid: &str) -> Record {
    let secret = SecretKey::from_bytes([7_u8; 32]);
    let npub = hex::encode(xonly_public_key(&secret).expect("fixed test key is valid"));

    let mut record = Record {
        uuid: RecordId::from(uuid),
        created_at: 1_700_000_000_000,
        bucket: "default".to_owned(),
        author: Author { npub },
        content: Content {
            text: format!("record {uuid}"),
            link: None,
        },
        geo: Geo {
            latitude: 48.8566,
            longitude: 2.3522,
        },
        integrity: Integrity {
            hash: Hash::default(),
            signature: String::new(),
        },
    };
    sign_record(&mut record, &secret).expect("signing a well-formed record");
    record
}

pub fn records(uuids: &[&str]) -> Vec<Record> {
    uuids.iter().map(|uuid| record(uuid)).collect()
}

pub fn uuid_set(records: &BTreeMap<RecordId, Record>) -> Vec<String> {
    records.keys().map(|uuid| uuid.to_string()).collect()
}

// ============================================================
// Pump
// ============================================================

/// Drive the room until every queue is drained and every node reports no
/// outstanding sync work. Runs under a paused tokio clock; the idle sleeps
/// advance it past batch, debounce, and completion timers.
pub async fn pump(room: &Room, nodes: &[(&str, &TestNode)]) {
    let ids: Vec<PeerId> = nodes.iter().map(|(id, _)| PeerId::from(*id)).collect();

    for round in 0.. {
        assert!(round < 10_000, "room did not converge");

        let mut progressed = false;
        for (peer, (_, node)) in ids.iter().zip(nodes) {
            while let Some(event) = room.poll(peer) {
                node.handle_event(event).await;
                progressed = true;
            }
        }

        if progressed {
            continue;
        }

        let mut quiescent = true;
        for (_, node) in nodes {
            if !node.is_quiescent().await {
                quiescent = false;
                break;
            }
        }

        if quiescent && !room.has_pending() {
            return;
        }

        // Let armed timers fire; under a paused clock this advances straight
        // to the next deadline.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
