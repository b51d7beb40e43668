#[cfg(test)]
#[path = "tests/handles.rs"]
mod tests;

use std::collections::BTreeMap;
use std::sync::Arc;

use peerset_primitives::{Record, RecordId};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::{Column, Database, StoreError};

/// Key under which the login token lives in the session table.
pub const LOGIN_TOKEN_KEY: &[u8] = b"loginToken";

/// Typed handle over the `records` table.
#[derive(Debug)]
pub struct RecordStore<D> {
    db: Arc<D>,
}

impl<D> Clone for RecordStore<D> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl<D: Database> RecordStore<D> {
    pub fn new(db: Arc<D>) -> Self {
        Self { db }
    }

    /// Persist a batch of records. Atomic: all or nothing.
    pub fn put_batch(&self, records: &BTreeMap<RecordId, Record>) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut entries = Vec::with_capacity(records.len());
        for (uuid, record) in records {
            entries.push((
                uuid.as_str().as_bytes().to_vec(),
                serde_json::to_vec(record)?,
            ));
        }

        self.db.put_batch(Column::Records, entries)
    }

    pub fn get(&self, uuid: &RecordId) -> Result<Option<Record>, StoreError> {
        let Some(bytes) = self.db.get(Column::Records, uuid.as_str().as_bytes())? else {
            return Ok(None);
        };

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Full enumeration of the table.
    pub fn get_all(&self) -> Result<BTreeMap<RecordId, Record>, StoreError> {
        let mut records = BTreeMap::new();

        for (key, value) in self.db.get_all(Column::Records)? {
            let uuid = RecordId::new(String::from_utf8_lossy(&key).into_owned());
            let record: Record = serde_json::from_slice(&value)?;
            let _ = records.insert(uuid, record);
        }

        Ok(records)
    }

    pub fn delete(&self, uuid: &RecordId) -> Result<(), StoreError> {
        self.db.delete(Column::Records, uuid.as_str().as_bytes())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.db.clear(Column::Records)
    }
}

/// Typed handle over the `session` table.
#[derive(Debug)]
pub struct SessionStore<D> {
    db: Arc<D>,
}

impl<D> Clone for SessionStore<D> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl<D: Database> SessionStore<D> {
    pub fn new(db: Arc<D>) -> Self {
        Self { db }
    }

    pub fn put_token<T: Serialize>(&self, token: &T) -> Result<(), StoreError> {
        self.db.put_batch(
            Column::Session,
            vec![(LOGIN_TOKEN_KEY.to_vec(), serde_json::to_vec(token)?)],
        )
    }

    pub fn get_token<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        let Some(bytes) = self.db.get(Column::Session, LOGIN_TOKEN_KEY)? else {
            return Ok(None);
        };

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub fn delete_token(&self) -> Result<(), StoreError> {
        self.db.delete(Column::Session, LOGIN_TOKEN_KEY)
    }
}
