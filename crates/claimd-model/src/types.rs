//! The three entity kinds: sessions, resources, and tickets.
//!
//! These are the shapes that cross every boundary: returned to API
//! callers, serialized into snapshots, decoded back on restart. The
//! engine owns the authoritative graph; values of these types are
//! always detached deep copies.
//!
//! # Breaking the cycle
//!
//! A ticket references its issuer and claimant sessions; a session lists
//! the tickets it issued and claims. Copied naively that graph never
//! terminates. The convention used everywhere: a ticket embedded in a
//! copy carries *stub* sessions, the issuer/claimant with their own
//! `claimed`/`issued` sequences emptied. That bounds the fan-out of any
//! copy to one level.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// A globally unique, time-ordered session identifier.
///
/// Newtype over the string form of a UUIDv7. Version 7 UUIDs embed a
/// millisecond timestamp in their high bits, so ids sort in creation
/// order, which is handy when eyeballing dumps of the session table.
///
/// `#[serde(transparent)]` keeps the JSON representation a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generates a fresh id from the current wall clock.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A client session: the identity through which all mutations happen.
///
/// Sessions are TTL-bounded: the engine deletes a session whose deadline
/// lapses without a refresh, revoking everything it issued and releasing
/// everything it claimed. The deadline itself is engine-internal state
/// and deliberately not part of this view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Generated at open; unique across the lifetime of the service.
    pub id: SessionId,

    /// Free-form label supplied by the client. Not unique.
    pub name: String,

    /// Origin descriptor (typically the client's `ip:port`).
    pub src: String,

    /// Caller-chosen lifetime in milliseconds.
    pub ttl_ms: u64,

    /// Tickets this session currently claims.
    ///
    /// Old snapshots may carry `null` here; that decodes as empty.
    #[serde(default, deserialize_with = "null_as_default")]
    pub claimed: Vec<Ticket>,

    /// Tickets this session currently issues.
    #[serde(default, deserialize_with = "null_as_default")]
    pub issued: Vec<Ticket>,
}

impl Session {
    /// Returns a copy with `claimed` and `issued` emptied.
    ///
    /// This is the stub form embedded in ticket copies to break the
    /// session ↔ ticket cycle.
    pub fn stub(&self) -> Session {
        Session {
            id: self.id.clone(),
            name: self.name.clone(),
            src: self.src.clone(),
            ttl_ms: self.ttl_ms,
            claimed: Vec::new(),
            issued: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

/// A named, data-carrying token inside a resource.
///
/// At most one session claims a ticket at a time. The issuer is the
/// session responsible for the ticket's existence — when the issuer
/// dies, the ticket is invalidated and swept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique within its resource.
    pub name: String,

    /// Back-reference to the owning resource. Snapshot restore uses this
    /// to find the canonical ticket when re-linking session sequences.
    pub resource_name: String,

    /// Opaque payload, copied in full on every clone. The engine imposes
    /// no size limit; the HTTP layer bounds it at 1 KiB.
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<u8>,

    /// The issuing session (as a stub), or `None` once invalidated and
    /// awaiting the sweep.
    pub issuer: Option<Box<Session>>,

    /// The claiming session (as a stub), if any. Always `None` for a
    /// lock ticket (the lock holder is the issuer).
    pub claimant: Option<Box<Session>>,
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// A named bucket of tickets, created lazily on first use and
/// garbage-collected by the sweep once empty.
///
/// A resource is either ticket-bearing or lockable; the `is_lock` tag is
/// fixed at creation and each kind rejects the other kind's operations.
/// A lockable resource holds at most one ticket, named after the
/// resource itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique key in the resource table.
    pub name: String,

    /// `true` for lockable resources, `false` for ticket-bearing ones.
    pub is_lock: bool,

    /// Tickets keyed by ticket name. Ordered so that encoding a
    /// resource is deterministic, which keeps snapshot files
    /// byte-identical for identical state.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tickets: BTreeMap<String, Ticket>,
}

/// Decodes an explicit `null` as the type's default.
///
/// `#[serde(default)]` alone only covers *missing* fields; snapshots
/// written by earlier builds can contain literal nulls for empty
/// sequences, and those must normalize to empty too.
fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

// =========================================================================
// Tests
// =========================================================================
