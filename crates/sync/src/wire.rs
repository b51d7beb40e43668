#[cfg(test)]
#[path = "tests/wire.rs"]
mod tests;

use std::collections::BTreeMap;

use peerset_merkle::SubtreeSummary;
use peerset_primitives::{Hash, Record, RecordId};
use serde::{Deserialize, Serialize};

/// The five message kinds of the reconciliation protocol.
///
/// JSON-tagged; an unknown tag fails to decode and the dispatcher drops the
/// message without touching peer state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncMessage {
    /// "This is my current root."
    #[serde(rename_all = "camelCase")]
    RootHash { merkle_root: Hash },

    /// "Send the summaries at this depth below `path`."
    RequestSubtree { path: String, depth: u32 },

    /// Response to `RequestSubtree`.
    SubtreeHashes { items: Vec<SubtreeSummary> },

    /// "Send me the full records for these identifiers."
    RequestRecords { uuids: Vec<RecordId> },

    /// Response to `RequestRecords`.
    Records { records: BTreeMap<RecordId, Record> },
}

impl SyncMessage {
    /// Message kind for logging and counters.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RootHash { .. } => "rootHash",
            Self::RequestSubtree { .. } => "requestSubtree",
            Self::SubtreeHashes { .. } => "subtreeHashes",
            Self::RequestRecords { .. } => "requestRecords",
            Self::Records { .. } => "records",
        }
    }

    /// Number of records carried, for traffic accounting.
    #[must_use]
    pub fn record_count(&self) -> usize {
        match self {
            Self::Records { records } => records.len(),
            _ => 0,
        }
    }
}
