//! Error types for the snapshot layer.

use claimd_model::ModelError;

/// Errors from writing or loading snapshot files.
///
/// Snapshots are best-effort: the snapshotter logs write failures and
/// keeps going, and the daemon treats any load failure as "no prior
/// state" (a warning, never a crash).
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Filesystem trouble: unreadable directory, failed rename, disk
    /// full.
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    /// A record failed to encode while writing a snapshot.
    #[error(transparent)]
    Codec(#[from] ModelError),

    /// A record failed to decode while loading a snapshot. Usually a
    /// torn or truncated file, or one written by an incompatible codec.
    #[error("corrupt snapshot: {0}")]
    Corrupt(ModelError),
}
