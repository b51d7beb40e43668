use peerset_primitives::PeerId;
use serde::{Deserialize, Serialize};

/// Where a sync with one peer stands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    Started,
    Completed { records_synced: Option<u64> },
    Failed { reason: String },
}

/// Observer notification emitted on sync phase transitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub peer_id: PeerId,
    #[serde(flatten)]
    pub status: SyncStatus,
    pub duration_ms: Option<u64>,
}

impl SyncEvent {
    #[must_use]
    pub fn started(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            status: SyncStatus::Started,
            duration_ms: None,
        }
    }

    #[must_use]
    pub fn completed(peer_id: PeerId, records_synced: Option<u64>, duration_ms: u64) -> Self {
        Self {
            peer_id,
            status: SyncStatus::Completed { records_synced },
            duration_ms: Some(duration_ms),
        }
    }

    #[must_use]
    pub fn failed(peer_id: PeerId, reason: impl Into<String>) -> Self {
        Self {
            peer_id,
            status: SyncStatus::Failed {
                reason: reason.into(),
            },
            duration_ms: None,
        }
    }
}
