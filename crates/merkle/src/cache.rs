#[cfg(test)]
#[path = "tests/cache.rs"]
mod tests;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::index::HashIndex;
use crate::tree::{build_tree, MerkleNode};

#[derive(Debug)]
struct CachedTree {
    root: Arc<MerkleNode>,
    version: u64,
    built_at: Instant,
}

/// Cache over the most recent tree build.
///
/// A build is reused while the index version it was built from is unchanged
/// and the build is younger than the TTL. Any index change produces a new
/// version and therefore a rebuild on the next request.
#[derive(Debug)]
pub struct TreeCache {
    ttl: Duration,
    slot: Mutex<Option<CachedTree>>,
}

impl TreeCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached tree for the index's current snapshot, rebuilding
    /// when stale.
    pub fn get_or_build(&self, index: &HashIndex) -> Arc<MerkleNode> {
        let snapshot = index.snapshot();

        let mut slot = self.slot.lock();

        if let Some(cached) = slot.as_ref() {
            if cached.version == snapshot.version && cached.built_at.elapsed() <= self.ttl {
                return Arc::clone(&cached.root);
            }
        }

        let root = Arc::new(build_tree(&snapshot.map));
        *slot = Some(CachedTree {
            root: Arc::clone(&root),
            version: snapshot.version,
            built_at: Instant::now(),
        });

        root
    }

    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }
}
