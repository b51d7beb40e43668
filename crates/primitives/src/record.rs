#[cfg(test)]
#[path = "tests/record.rs"]
mod tests;

use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::Hash;

/// Record identifier (128-bit uuid rendered as a string).
///
/// Ordering is the lexicographic order of the uuid string; the Merkle leaf
/// order is defined in terms of it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Record author: an x-only secp256k1 public key, lowercase hex.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub npub: String,
}

/// Record payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub text: String,
    pub link: Option<String>,
}

/// Geographic anchor of the record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    pub latitude: f64,
    pub longitude: f64,
}

/// Content hash and author signature over the canonical serialization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integrity {
    pub hash: Hash,
    pub signature: String,
}

/// A signed, hashed unit of data, keyed by `uuid`.
///
/// Immutable once admitted: `integrity.hash` commits to every other field,
/// so two records with equal hashes are the same record. Field order matters
/// for the canonical serialization and matches the wire schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub uuid: RecordId,
    pub created_at: u64,
    pub bucket: String,
    pub author: Author,
    pub content: Content,
    pub geo: Geo,
    pub integrity: Integrity,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordError {
    #[error("record is not canonically serializable: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Borrowed view for canonical hashing: the record without `integrity`,
/// fields in declared wire order.
#[derive(Serialize)]
struct CanonicalRecord<'a> {
    uuid: &'a RecordId,
    created_at: u64,
    bucket: &'a str,
    author: &'a Author,
    content: &'a Content,
    geo: &'a Geo,
}

impl Record {
    /// Canonical serialization: JSON of all fields except `integrity`, in
    /// wire order, as UTF-8 bytes.
    ///
    /// Fails only when the geo coordinates are non-finite, which JSON cannot
    /// represent; such a record is malformed and gets dropped by ingestion.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, RecordError> {
        let canonical = CanonicalRecord {
            uuid: &self.uuid,
            created_at: self.created_at,
            bucket: self.bucket.as_str(),
            author: &self.author,
            content: &self.content,
            geo: &self.geo,
        };

        Ok(serde_json::to_vec(&canonical)?)
    }

    /// SHA-256 of the canonical serialization.
    pub fn content_hash(&self) -> Result<Hash, RecordError> {
        Ok(Hash::digest(self.canonical_bytes()?))
    }

    /// Whether `integrity.hash` matches the recomputed content hash.
    #[must_use]
    pub fn verify_integrity(&self) -> bool {
        self.content_hash()
            .map_or(false, |hash| hash == self.integrity.hash)
    }
}
