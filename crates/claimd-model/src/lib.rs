//! Entity types and snapshot codec for claimd.
//!
//! This crate defines the caller-visible shapes of the coordination
//! service (sessions, resources, and tickets) plus the [`Codec`] trait
//! used to encode them for snapshots.
//!
//! Everything here is a *detached copy*: the engine's authoritative state
//! lives elsewhere, and values of these types are deep clones handed to
//! callers (or written to disk). Mutating them never affects the engine.
//!
//! # How it fits in the stack
//!
//! ```text
//! HTTP layer (above)      ← serves these types as JSON responses
//!     ↕
//! Engine (above)          ← builds these as deep-copy views of its state
//!     ↕
//! Model layer (this crate) ← defines the types and their encoding
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ModelError;
pub use types::{Resource, Session, SessionId, Ticket};
