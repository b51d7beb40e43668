//! Test doubles for exercising persistence-failure paths.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::db::{Column, Database, StoreError};

/// Wrapper database whose writes can be made to fail on demand.
///
/// Reads always pass through. Used by ingestion tests to assert that a
/// whole-batch persistence failure aborts the batch and clears sync state.
#[derive(Debug)]
pub struct FailingDB<D> {
    inner: D,
    fail_writes: AtomicBool,
}

impl<D> FailingDB<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".to_owned()));
        }
        Ok(())
    }
}

impl<D: Database> Database for FailingDB<D> {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(column, key)
    }

    fn put_batch(
        &self,
        column: Column,
        entries: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put_batch(column, entries)
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(column, key)
    }

    fn get_all(&self, column: Column) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.inner.get_all(column)
    }

    fn clear(&self, column: Column) -> Result<(), StoreError> {
        self.check()?;
        self.inner.clear(column)
    }
}
