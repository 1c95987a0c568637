//! Realtime tree store for watchparty presence.
//!
//! A JSON tree addressed by slash-separated paths, with watch streams,
//! last-write-wins writes, atomic counter updates, append-only logs, and
//! per-connection deferred actions that the store fires itself when it
//! detects a connection was lost (lease expiry or forced sever). Clients
//! never coordinate directly; everything goes through this tree and its
//! change notifications.

pub mod error;
pub mod path;
pub mod session;
pub mod store;
pub mod value;

mod tree;

pub use error::StoreError;
pub use path::StorePath;
pub use session::{Connection, ConnectionState, LeaseConfig, OnDisconnect, run_lease_sweeper};
pub use store::RealtimeStore;
pub use value::{FieldValue, Fields, Snapshot, field};
