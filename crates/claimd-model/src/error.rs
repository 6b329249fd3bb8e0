//! Error types for the model layer.

/// Errors from encoding or decoding model types.
///
/// Codec errors are kept separate from the engine's operational errors:
/// a `ModelError` means bytes were malformed or a value could not be
/// represented, never that an operation was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Serialization failed (turning a value into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes back into a value).
    /// Common causes: truncated snapshot records or hand-edited files.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
