use async_trait::async_trait;
use peerset_primitives::PeerId;
use thiserror::Error;

use crate::wire::SyncMessage;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("peer {0} is not reachable")]
    Unreachable(PeerId),

    #[error("transport send failed: {0}")]
    Send(String),
}

/// Peer-addressed messaging seam.
///
/// The engine only needs directed sends and a broadcast; join/leave and
/// inbound messages arrive at the node as [`TransportEvent`]s. Send failures
/// are transient by contract: the caller logs them and the next root
/// exchange retries.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, peer: &PeerId, message: SyncMessage) -> Result<(), TransportError>;

    async fn broadcast(&self, message: SyncMessage) -> Result<(), TransportError>;
}

/// What the transport delivers to the node.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    PeerJoined(PeerId),
    PeerLeft(PeerId),
    Message(PeerId, SyncMessage),
}
