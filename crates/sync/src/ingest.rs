use std::collections::BTreeMap;

use async_trait::async_trait;
use peerset_primitives::{Record, RecordId};
use tracing::warn;

/// Admission predicate over record batches.
///
/// Total over its input: every uuid in the batch gets a verdict. The engine
/// treats a missing verdict as a rejection.
#[async_trait]
pub trait Moderator: Send + Sync + 'static {
    async fn moderate_batch(
        &self,
        records: &BTreeMap<RecordId, Record>,
    ) -> BTreeMap<RecordId, bool>;
}

/// Moderation that admits everything. The default for tests and closed
/// deployments.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

#[async_trait]
impl Moderator for AcceptAll {
    async fn moderate_batch(
        &self,
        records: &BTreeMap<RecordId, Record>,
    ) -> BTreeMap<RecordId, bool> {
        records.keys().map(|uuid| (uuid.clone(), true)).collect()
    }
}

/// Drop malformed entries from an inbound batch before moderation.
///
/// A record keyed under a uuid it does not claim is a protocol violation;
/// only that record is dropped, the rest of the batch proceeds.
#[must_use]
pub fn sanitize_batch(records: BTreeMap<RecordId, Record>) -> BTreeMap<RecordId, Record> {
    records
        .into_iter()
        .filter(|(uuid, record)| {
            if &record.uuid != uuid {
                warn!(%uuid, record_uuid = %record.uuid, "dropping record with mismatched uuid key");
                return false;
            }
            true
        })
        .collect()
}

/// Keep the records the moderator approved.
#[must_use]
pub fn approved_subset(
    records: BTreeMap<RecordId, Record>,
    verdicts: &BTreeMap<RecordId, bool>,
) -> BTreeMap<RecordId, Record> {
    records
        .into_iter()
        .filter(|(uuid, _)| verdicts.get(uuid).copied().unwrap_or(false))
        .collect()
}
