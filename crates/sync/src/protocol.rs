//! Stateless handlers for the progressive-descent protocol.
//!
//! Each function maps one inbound message to the replies it warrants, given
//! the local tree. No peer state is read or written here; the manager owns
//! that. Handlers are idempotent, so duplicate descents from a symmetric
//! peer are harmless.

#[cfg(test)]
#[path = "tests/protocol.rs"]
mod tests;

use std::collections::BTreeMap;

use peerset_merkle::{expose, subtree_at, MerkleNode, SubtreeSummary, TreePath};
use peerset_primitives::{Hash, Record, RecordId};
use tracing::warn;

use crate::wire::SyncMessage;

/// Compare an announced root against ours.
///
/// Equal roots need no traffic; a differing root opens the descent at the
/// tree root, one level deep.
#[must_use]
pub fn handle_root_hash(local_root: &MerkleNode, announced: Hash) -> Option<SyncMessage> {
    if local_root.hash == announced {
        return None;
    }

    Some(SyncMessage::RequestSubtree {
        path: String::new(),
        depth: 1,
    })
}

/// Answer a subtree-hash request.
///
/// An absent path answers with an empty list; an unparseable path is a
/// protocol violation and produces no reply.
#[must_use]
pub fn handle_subtree_request(
    local_root: &MerkleNode,
    path: &str,
    depth: u32,
) -> Option<SyncMessage> {
    let parsed: TreePath = match path.parse() {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(%path, %err, "dropping subtree request with malformed path");
            return None;
        }
    };

    let items = subtree_at(local_root, &parsed)
        .map(|node| expose(node, &parsed, depth))
        .unwrap_or_default();

    Some(SyncMessage::SubtreeHashes { items })
}

/// What a batch of subtree summaries tells us to do next.
#[derive(Debug, Default, PartialEq)]
pub struct DescentOutcome {
    /// Deeper requests for subtrees that differ and have children.
    pub requests: Vec<SyncMessage>,
    /// Uuids at differing leaf-depth subtrees that we do not hold.
    pub needed: Vec<RecordId>,
}

/// Walk a peer's subtree summaries against our tree.
///
/// Matching hashes end the descent on that branch. A differing subtree with
/// children descends one level; at leaf depth its uuids are candidates,
/// filtered against the local hash index. Items with malformed paths are
/// dropped individually.
#[must_use]
pub fn handle_subtree_hashes(
    local_root: &MerkleNode,
    local_index: &BTreeMap<RecordId, Hash>,
    items: &[SubtreeSummary],
) -> DescentOutcome {
    let mut outcome = DescentOutcome::default();

    for item in items {
        let parsed: TreePath = match item.path.parse() {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(path = %item.path, %err, "dropping subtree summary with malformed path");
                continue;
            }
        };

        let local_node = subtree_at(local_root, &parsed);

        if let Some(local_node) = local_node {
            if local_node.hash == item.hash {
                continue;
            }
        }

        if item.has_children {
            outcome.requests.push(SyncMessage::RequestSubtree {
                path: item.path.clone(),
                depth: 1,
            });
        } else {
            for uuid in &item.uuids {
                if !local_index.contains_key(uuid) {
                    outcome.needed.push(uuid.clone());
                }
            }
        }
    }

    outcome
}

/// Answer a record request with the subset of records we hold.
///
/// Missing uuids are silently omitted: the requester may be asking for
/// records our moderator rejected, and absence is the correct answer.
#[must_use]
pub fn handle_record_request<F>(lookup: F, uuids: &[RecordId]) -> SyncMessage
where
    F: Fn(&RecordId) -> Option<Record>,
{
    let records: BTreeMap<RecordId, Record> = uuids
        .iter()
        .filter_map(|uuid| lookup(uuid).map(|record| (uuid.clone(), record)))
        .collect();

    SyncMessage::Records { records }
}
