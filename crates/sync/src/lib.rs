//! Merkle set-reconciliation for peerset nodes.
//!
//! Two peers holding keyed sets of signed records converge by comparing
//! Merkle roots, descending into differing subtrees one level at a time, and
//! exchanging only the records one side is missing. The protocol is
//! symmetric and stateless at the message level; both peers may initiate and
//! duplicate descents are harmless.
//!
//! ## Pieces
//!
//! - [`wire`]: the five message kinds exchanged over the transport
//! - [`transport`]: the peer-addressed messaging seam the node plugs in
//! - [`protocol`]: stateless handlers mapping inbound messages to replies
//! - [`batcher`]: per-peer accumulator coalescing record requests
//! - [`ingest`]: moderation seam and batch admission
//! - [`manager`]: the per-peer state machine tying it all together
//!   (initiation, liveness, timeouts, debounced root recomputation,
//!   reverse sync)

pub mod batcher;
pub mod config;
pub mod events;
pub mod ingest;
pub mod manager;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod wire;

pub use batcher::RecordBatcher;
pub use config::SyncConfig;
pub use events::{SyncEvent, SyncStatus};
pub use ingest::{AcceptAll, Moderator};
pub use manager::SyncManager;
pub use state::{SyncPhase, TrafficStats};
pub use transport::{Transport, TransportError, TransportEvent};
pub use wire::SyncMessage;
