#[cfg(test)]
#[path = "../tests/db/memory.rs"]
mod tests;

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use strum::IntoEnumIterator;

use super::{Column, Database, StoreError};

type ColumnMap = BTreeMap<Box<[u8]>, Box<[u8]>>;

/// In-memory reference database.
///
/// One `RwLock`-guarded ordered map per column; a batched put commits under
/// a single write guard, so readers observe it fully or not at all.
#[derive(Debug)]
pub struct InMemoryDB {
    columns: HashMap<Column, RwLock<ColumnMap>>,
}

impl InMemoryDB {
    #[must_use]
    pub fn new() -> Self {
        Self {
            columns: Column::iter()
                .map(|column| (column, RwLock::new(ColumnMap::new())))
                .collect(),
        }
    }

    fn column(&self, column: Column) -> &RwLock<ColumnMap> {
        self.columns
            .get(&column)
            .unwrap_or_else(|| unreachable!("all columns are initialized at construction"))
    }
}

impl Default for InMemoryDB {
    fn default() -> Self {
        Self::new()
    }
}

impl Database for InMemoryDB {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.column(column).read().get(key).map(|v| v.to_vec()))
    }

    fn put_batch(
        &self,
        column: Column,
        entries: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<(), StoreError> {
        let mut guard = self.column(column).write();

        for (key, value) in entries {
            let _ = guard.insert(key.into_boxed_slice(), value.into_boxed_slice());
        }

        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        let _ = self.column(column).write().remove(key);
        Ok(())
    }

    fn get_all(&self, column: Column) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self
            .column(column)
            .read()
            .iter()
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect())
    }

    fn clear(&self, column: Column) -> Result<(), StoreError> {
        self.column(column).write().clear();
        Ok(())
    }
}
