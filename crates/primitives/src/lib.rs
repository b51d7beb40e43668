//! Core primitive types shared across the peerset crates.
//!
//! Everything here is plain data: the [`Record`] wire/at-rest schema, the
//! [`Hash`] digest newtype, and the string-keyed identifiers used by the
//! store, the Merkle layer, and the sync protocol.

pub mod hash;
pub mod peer;
pub mod record;
pub mod time;

pub use hash::Hash;
pub use peer::PeerId;
pub use record::{Author, Content, Geo, Integrity, Record, RecordError, RecordId};
pub use time::now_ms;
