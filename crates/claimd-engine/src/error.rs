//! Error types for the engine.

use claimd_model::SessionId;

/// Errors returned by engine operations.
///
/// The first four variants form the "not found" family: an HTTP
/// transport maps them to 404 and everything else to a generic failure.
/// Use [`EngineError::is_not_found`] rather than matching variants so
/// the transport doesn't have to track which variants belong.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No session with this id. Either it never existed or its TTL
    /// lapsed and the sweep removed it.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// No resource with this name. Resources are created lazily by
    /// issue/lock and garbage-collected when empty, so "not found"
    /// often just means "nothing outstanding".
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The lock resource exists but holds no lock ticket.
    #[error("no lock held on resource: {0}")]
    LockNotFound(String),

    /// An unlock attempt by a session that doesn't hold the lock.
    #[error("session {session} does not hold the lock on {resource}")]
    NotHolder {
        session: SessionId,
        resource: String,
    },

    /// A ticket operation against a lockable resource, or a lock
    /// operation against a ticket-bearing one. The tag is fixed at
    /// resource creation and never changes.
    #[error("wrong resource type: {0}")]
    WrongResourceType(String),

    /// A lock resource holds a ticket shape that should be impossible:
    /// more than one ticket, or a ticket not named after the resource.
    #[error("malformed lock resource: {0}")]
    Malformed(String),

    /// RevokeTicket named a ticket that doesn't exist in an existing
    /// resource.
    #[error("unknown ticket {ticket} for resource {resource}")]
    UnknownTicket { resource: String, ticket: String },

    /// The engine's command channel is closed, or the reply was dropped
    /// mid-operation (the writer hit a fault and restarted). Callers
    /// must treat this like a transport failure: the operation may or
    /// may not have taken effect.
    #[error("engine unavailable")]
    Unavailable,
}

impl EngineError {
    /// `true` for the variants the transport surfaces as "absent"
    /// (HTTP 404): unknown session, unknown resource, unknown lock,
    /// and non-holder unlock.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_)
                | Self::ResourceNotFound(_)
                | Self::LockNotFound(_)
                | Self::NotHolder { .. }
        )
    }
}

/// Errors from rebuilding engine state out of a decoded snapshot.
///
/// Any of these means the snapshot pair is internally inconsistent
/// (e.g. torn across the two files). The caller logs a warning and
/// starts the engine empty; a bad snapshot is never fatal.
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    /// A session's ticket sequence references a resource that isn't in
    /// the resource table.
    #[error("snapshot references unknown resource: {0}")]
    MissingResource(String),

    /// A session's ticket sequence references a ticket that isn't in
    /// its resource.
    #[error("snapshot references unknown ticket {ticket} on resource {resource}")]
    MissingTicket { resource: String, ticket: String },
}
