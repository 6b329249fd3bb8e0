//! Unified error type for the claimd meta crate.

use claimd_engine::{EngineError, RestoreError};
use claimd_model::ModelError;
use claimd_snapshot::SnapshotError;

/// Top-level error that wraps all crate-specific errors.
///
/// Consumers of the meta crate can deal with this single type instead
/// of importing errors from each sub-crate; the `#[from]` attributes
/// let `?` convert sub-crate errors automatically. The binary returns
/// it from `main`, with [`ClaimdError::Http`] covering the listener.
#[derive(Debug, thiserror::Error)]
pub enum ClaimdError {
    /// An engine-level error (unknown session, wrong resource type,
    /// engine unavailable).
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A snapshot restore error (inconsistent pair of files).
    #[error(transparent)]
    Restore(#[from] RestoreError),

    /// A snapshot file error (io, encode, corrupt).
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// A model-level codec error.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The HTTP listener failed to bind or serve.
    #[error("http server: {0}")]
    Http(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimd_model::SessionId;

    #[test]
    fn test_from_engine_error() {
        let err = EngineError::SessionNotFound(SessionId::from("gone"));
        let claimd_err: ClaimdError = err.into();
        assert!(matches!(claimd_err, ClaimdError::Engine(_)));
        assert!(claimd_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_restore_error() {
        let err = RestoreError::MissingResource("queue".into());
        let claimd_err: ClaimdError = err.into();
        assert!(matches!(claimd_err, ClaimdError::Restore(_)));
    }

    #[test]
    fn test_from_snapshot_error() {
        let err = SnapshotError::Io(std::io::Error::other("disk full"));
        let claimd_err: ClaimdError = err.into();
        assert!(matches!(claimd_err, ClaimdError::Snapshot(_)));
    }

    #[test]
    fn test_from_io_error_is_http() {
        let err = std::io::Error::other("address in use");
        let claimd_err: ClaimdError = err.into();
        assert!(matches!(claimd_err, ClaimdError::Http(_)));
        assert!(claimd_err.to_string().contains("address in use"));
    }
}
