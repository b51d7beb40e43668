pub mod memory;

use strum::EnumIter;
use thiserror::Error;

/// Storage columns (tables).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter)]
pub enum Column {
    /// `uuid → record JSON`.
    Records,
    /// Single-key table holding the login token.
    Session,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("value codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Column-addressed byte-map storage.
///
/// `put_batch` is atomic per batch: a batch is observable either fully or
/// not at all by subsequent reads.
pub trait Database: Send + Sync + 'static {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn put_batch(
        &self,
        column: Column,
        entries: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<(), StoreError>;

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError>;

    fn get_all(&self, column: Column) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    fn clear(&self, column: Column) -> Result<(), StoreError>;
}
