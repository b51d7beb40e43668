#[cfg(test)]
#[path = "tests/tree.rs"]
mod tests;

use std::collections::BTreeMap;

use peerset_primitives::{Hash, RecordId};
use serde::{Deserialize, Serialize};

use crate::path::{Direction, TreePath};

/// A node of the canonical Merkle tree.
///
/// Leaves carry a single uuid and its content hash. Internal nodes hash the
/// concatenation of their children's lowercase-hex digests and carry the
/// sorted union of descendant uuids. Built trees are never mutated; a
/// recomputation produces a fresh tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleNode {
    pub hash: Hash,
    pub uuids: Vec<RecordId>,
    pub left: Option<Box<MerkleNode>>,
    pub right: Option<Box<MerkleNode>>,
    pub is_leaf: bool,
}

impl MerkleNode {
    fn leaf(uuid: RecordId, hash: Hash) -> Self {
        Self {
            hash,
            uuids: vec![uuid],
            left: None,
            right: None,
            is_leaf: true,
        }
    }

    /// The distinguished empty-set root: `SHA-256("")`, no uuids.
    fn empty() -> Self {
        Self {
            hash: Hash::digest(b""),
            uuids: Vec::new(),
            left: None,
            right: None,
            is_leaf: true,
        }
    }

    fn join(left: MerkleNode, right: MerkleNode) -> Self {
        let hash = Hash::digest(format!("{}{}", left.hash, right.hash));

        // Leaves are built in sorted uuid order and pairing preserves it, so
        // every uuid under `left` precedes every uuid under `right`.
        let mut uuids = Vec::with_capacity(left.uuids.len() + right.uuids.len());
        uuids.extend_from_slice(&left.uuids);
        uuids.extend_from_slice(&right.uuids);

        Self {
            hash,
            uuids,
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
            is_leaf: false,
        }
    }

    /// Whether a subtree-hash listing should descend below this node.
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.is_leaf && (self.left.is_some() || self.right.is_some())
    }
}

/// Build the canonical tree for a hash-index snapshot.
///
/// Leaves are the `(uuid, content-hash)` pairs in lexicographic uuid order.
/// Adjacent nodes pair up level by level; an odd trailing node is promoted
/// unchanged to the next level, never re-hashed. The empty map yields the
/// distinguished empty leaf, so two empty trees compare equal.
#[must_use]
pub fn build_tree(index: &BTreeMap<RecordId, Hash>) -> MerkleNode {
    if index.is_empty() {
        return MerkleNode::empty();
    }

    let mut level: Vec<MerkleNode> = index
        .iter()
        .map(|(uuid, hash)| MerkleNode::leaf(uuid.clone(), *hash))
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut nodes = level.into_iter();

        while let Some(left) = nodes.next() {
            match nodes.next() {
                Some(right) => next.push(MerkleNode::join(left, right)),
                None => next.push(left),
            }
        }

        level = next;
    }

    level
        .into_iter()
        .next()
        .unwrap_or_else(|| unreachable!("non-empty input always leaves a root"))
}

/// Follow a path from `node`; `None` when the path leaves the tree.
#[must_use]
pub fn subtree_at<'a>(node: &'a MerkleNode, path: &TreePath) -> Option<&'a MerkleNode> {
    let mut current = node;

    for step in path.steps() {
        current = match step {
            Direction::Left => current.left.as_deref()?,
            Direction::Right => current.right.as_deref()?,
        };
    }

    Some(current)
}

/// Wire summary of one subtree, as exchanged in `SUBTREE_HASHES`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreeSummary {
    pub path: String,
    pub hash: Hash,
    pub uuids: Vec<RecordId>,
    pub has_children: bool,
}

impl SubtreeSummary {
    fn of(node: &MerkleNode, path: &TreePath) -> Self {
        Self {
            path: path.to_string(),
            hash: node.hash,
            uuids: node.uuids.clone(),
            has_children: node.has_children(),
        }
    }
}

/// Summaries of every descendant exactly `depth` levels below `node`.
///
/// `depth = 0` yields the singleton summary of `node` itself. Promoted nodes
/// have no sibling; the present child is reported alone.
#[must_use]
pub fn expose(node: &MerkleNode, base_path: &TreePath, depth: u32) -> Vec<SubtreeSummary> {
    let mut summaries = Vec::new();
    collect(node, base_path, depth, &mut summaries);
    summaries
}

fn collect(node: &MerkleNode, path: &TreePath, depth: u32, out: &mut Vec<SubtreeSummary>) {
    if depth == 0 {
        out.push(SubtreeSummary::of(node, path));
        return;
    }

    if let Some(left) = node.left.as_deref() {
        collect(left, &path.child(Direction::Left), depth - 1, out);
    }
    if let Some(right) = node.right.as_deref() {
        collect(right, &path.child(Direction::Right), depth - 1, out);
    }
}
