#[cfg(test)]
#[path = "tests/prune.rs"]
mod tests;

use peerset_store::{Database, RecordStore, StoreError};

use crate::index::{HashIndex, IndexUpdate};

/// Age-based retention hook: delete records created before `cutoff_ms` from
/// the store and the hash index. Returns how many records were removed.
pub fn prune_older_than<D: Database>(
    store: &RecordStore<D>,
    index: &HashIndex,
    cutoff_ms: u64,
) -> Result<usize, StoreError> {
    let mut updates = Vec::new();

    for (uuid, record) in store.get_all()? {
        if record.created_at < cutoff_ms {
            store.delete(&uuid)?;
            updates.push(IndexUpdate::Remove { uuid });
        }
    }

    let removed = updates.len();
    index.apply(updates);

    Ok(removed)
}
