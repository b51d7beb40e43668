//! Durable key-value storage for peerset.
//!
//! A narrow [`Database`] abstraction over column-addressed byte maps, an
//! in-memory reference implementation, and typed handles for the two tables
//! the engine uses: `records` (uuid → record JSON) and `session` (the login
//! token).

pub mod db;
pub mod handles;
pub mod testing;

pub use db::memory::InMemoryDB;
pub use db::{Column, Database, StoreError};
pub use handles::{RecordStore, SessionStore};
