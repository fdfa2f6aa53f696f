//! Durable state for Vigil.
//!
//! - [`SnapshotEngine`] — dumps every object's masked attributes to a framed
//!   file and restores them in parallel on startup
//! - [`RepositoryStore`] — one topology file per sender endpoint
//! - [`atomic`] — write-temp-then-rename helpers shared by both
//! - [`netstring`] — the record framing used in snapshot files

pub mod atomic;
mod error;
pub mod netstring;
mod repository;
mod snapshot;

pub use error::{StorageError, StorageResult};
pub use repository::{RepositoryStore, REPOSITORY_SUFFIX};
pub use snapshot::{
    DumpStats, RestoreStats, SnapshotConfig, SnapshotEngine, SnapshotRecord, DEFAULT_QUEUE_CAPACITY,
};
