//! The claimd engine: sessions, tickets, and locks behind one writer.
//!
//! This crate is the state-machine core of the coordination service:
//!
//! 1. **Single-writer serializer**: every operation is a command
//!    executed by one task ([`Engine`], [`EngineHandle`])
//! 2. **Lifecycle semantics**: TTL expiry, the claim/release protocol,
//!    ticket takeover, lock exclusivity (`state` module, internal)
//! 3. **Snapshot restore**: rebuilding the cyclic session ↔ ticket
//!    graph from decoded snapshot tables (`restore` module, internal)
//!
//! # How it fits in the stack
//!
//! ```text
//! HTTP layer / snapshotter (above)  ← drive operations via EngineHandle
//!     ↕
//! Engine (this crate)               ← owns the authoritative tables
//!     ↕
//! Model layer (below)               ← defines the copied-out view types
//! ```

mod engine;
mod error;
mod restore;
mod state;

pub use engine::{Engine, EngineConfig, EngineHandle, DEFAULT_EXPIRE_TICK_MS};
pub use error::{EngineError, RestoreError};
