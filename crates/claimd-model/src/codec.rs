//! Codec trait and implementations for snapshot records.
//!
//! A codec converts between model types and raw bytes. The snapshot
//! layer doesn't care HOW records are serialized; it just needs
//! something that implements [`Codec`], so the format can be swapped
//! without touching the file-handling code.
//!
//! Snapshot files are framed as one encoded record per line, so an
//! encoding must never emit unescaped newlines. JSON satisfies this
//! (newlines inside strings are escaped); a binary codec would need its
//! own framing and a different [`extension`](Codec::extension).

use serde::{de::DeserializeOwned, Serialize};

use crate::ModelError;

/// A codec that can encode model types to bytes and decode them back.
///
/// `Send + Sync + 'static` because the snapshotter task owns a codec and
/// Tokio may run it on any worker thread.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ModelError::Encode`] if the value cannot be represented
    /// in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ModelError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ModelError::Decode`] if the bytes are malformed,
    /// truncated, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ModelError>;

    /// File extension for snapshot files written with this codec.
    /// Must stay stable across a deployment, or restarts won't find
    /// their own snapshots.
    fn extension(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// Human-readable, which makes snapshot files directly inspectable when
/// debugging a restart problem. The tradeoff is size (ticket payloads
/// encode as arrays of numbers), but snapshots are periodic whole-state
/// dumps of a service sized for thousands of entities, not millions.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ModelError> {
        serde_json::to_vec(value).map_err(ModelError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ModelError> {
        serde_json::from_slice(data).map_err(ModelError::Decode)
    }

    fn extension(&self) -> &'static str {
        "jsonl"
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Session, SessionId};

    #[test]
    fn test_json_codec_round_trips_a_session() {
        let codec = JsonCodec;
        let sess = Session {
            id: SessionId::from("s1"),
            name: "test".into(),
            src: "ANY".into(),
            ttl_ms: 5000,
            claimed: Vec::new(),
            issued: Vec::new(),
        };

        let bytes = codec.encode(&sess).unwrap();
        let decoded: Session = codec.decode(&bytes).unwrap();
        assert_eq!(sess, decoded);
    }

    #[test]
    fn test_json_codec_encoding_is_single_line() {
        // The snapshot writer frames records with newlines, so encoded
        // records must not contain raw newlines, even when the payload
        // or a name does.
        let codec = JsonCodec;
        let sess = Session {
            id: SessionId::from("s1"),
            name: "multi\nline\nname".into(),
            src: "ANY".into(),
            ttl_ms: 1,
            claimed: Vec::new(),
            issued: Vec::new(),
        };

        let bytes = codec.encode(&sess).unwrap();
        assert!(!bytes.contains(&b'\n'));
    }

    #[test]
    fn test_json_codec_decode_garbage_returns_error() {
        let codec = JsonCodec;
        let result: Result<Session, _> = codec.decode(b"not json at all");
        assert!(matches!(result, Err(ModelError::Decode(_))));
    }

    #[test]
    fn test_json_codec_extension_is_stable() {
        assert_eq!(JsonCodec.extension(), "jsonl");
    }
}
