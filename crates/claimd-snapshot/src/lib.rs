//! Periodic snapshots of claimd engine state.
//!
//! Two pieces:
//!
//! - [`write_snapshot`] / [`load_snapshot`]: the file format, one
//!   codec-encoded record per line, a `sessions` file and a `resources`
//!   file, each replaced atomically via temp-file + rename.
//! - [`spawn`]: the snapshotter task that dumps the engine's
//!   introspection views on an interval until [`SnapshotterHandle::stop`]
//!   drains it.
//!
//! Durability is best-effort by design: losing the last interval's
//! worth of changes on a crash is acceptable, and a snapshot that fails
//! to load leaves the engine starting empty.

mod error;
mod files;
mod snapshotter;

pub use error::SnapshotError;
pub use files::{load_snapshot, write_snapshot, SnapshotTables};
pub use snapshotter::{spawn, SnapshotterHandle, DEFAULT_SNAPSHOT_INTERVAL_MS};
