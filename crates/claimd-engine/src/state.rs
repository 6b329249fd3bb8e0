//! The authoritative state: every session, resource, and ticket.
//!
//! This is the data the single-writer task owns. Nothing in here is
//! shared or locked: the engine actor is the only code that ever
//! touches a `State`, so these are plain maps and plain methods.
//!
//! # Identity over pointers
//!
//! The session ↔ ticket graph is cyclic (a ticket knows its issuer and
//! claimant; a session lists its issued and claimed tickets). Rather
//! than reference-counted cells, cross-entity links are *ids*: tickets
//! store `SessionId`s, sessions store `(resource, ticket)` keys, and
//! every access resolves the id against the owning table. A key that no
//! longer resolves (its ticket was revoked or replaced by a takeover)
//! is simply skipped. This keeps ownership trivial: `sessions` owns
//! session records, each resource owns its ticket records, and that's
//! the whole story.

use std::collections::HashMap;
use std::time::Duration;

use claimd_model::{Resource, Session, SessionId, Ticket};
use tokio::time::Instant;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Identity of a ticket: which resource it lives in, and its name there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TicketKey {
    pub(crate) resource: String,
    pub(crate) ticket: String,
}

/// Authoritative record of one session.
#[derive(Debug)]
pub(crate) struct SessionRecord {
    pub(crate) id: SessionId,
    pub(crate) name: String,
    pub(crate) src: String,
    pub(crate) ttl_ms: u64,
    /// Absolute deadline. Recomputed on open, refresh, and every ticket
    /// issued on this session's behalf.
    pub(crate) expires_at: Instant,
    /// Tickets this session claims, by identity.
    pub(crate) claimed: Vec<TicketKey>,
    /// Tickets this session issued, by identity.
    pub(crate) issued: Vec<TicketKey>,
}

impl SessionRecord {
    /// Pushes the deadline out to `now + ttl`.
    pub(crate) fn refresh(&mut self, now: Instant) {
        self.expires_at = now + Duration::from_millis(self.ttl_ms);
    }
}

/// Authoritative record of one ticket.
#[derive(Debug)]
pub(crate) struct TicketRecord {
    pub(crate) name: String,
    pub(crate) resource_name: String,
    pub(crate) data: Vec<u8>,
    /// Issuing session, or `None` once invalidated (issuer died). The
    /// sweep removes issuer-less tickets.
    pub(crate) issuer: Option<SessionId>,
    /// Claiming session, if any. Always `None` on lock tickets.
    pub(crate) claimant: Option<SessionId>,
}

/// Authoritative record of one resource.
#[derive(Debug)]
pub(crate) struct ResourceRecord {
    pub(crate) name: String,
    pub(crate) is_lock: bool,
    pub(crate) tickets: HashMap<String, TicketRecord>,
}

impl ResourceRecord {
    fn new(name: String, is_lock: bool) -> Self {
        Self {
            name,
            is_lock,
            tickets: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// The two top-level tables. Owned exclusively by the engine actor.
#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) sessions: HashMap<SessionId, SessionRecord>,
    pub(crate) resources: HashMap<String, ResourceRecord>,
}

impl State {
    // -- Session operations ------------------------------------------------

    /// Opens a new session and returns its generated id. Cannot fail.
    pub(crate) fn open_session(
        &mut self,
        name: &str,
        src: &str,
        ttl_ms: u64,
        now: Instant,
    ) -> SessionId {
        let id = SessionId::generate();
        let mut record = SessionRecord {
            id: id.clone(),
            name: name.to_string(),
            src: src.to_string(),
            ttl_ms,
            expires_at: now,
            claimed: Vec::new(),
            issued: Vec::new(),
        };
        record.refresh(now);
        tracing::info!(session = %id, name, src, ttl_ms, "session opened");
        self.sessions.insert(id.clone(), record);
        id
    }

    /// Closes a session: releases its claims, invalidates its
    /// issuances, and removes it.
    pub(crate) fn close_session(&mut self, id: &SessionId) -> Result<(), EngineError> {
        if !self.sessions.contains_key(id) {
            return Err(EngineError::SessionNotFound(id.clone()));
        }
        tracing::info!(session = %id, "session closed");
        self.clear_claims(id);
        self.sessions.remove(id);
        Ok(())
    }

    /// Pushes a session's deadline out by its TTL.
    pub(crate) fn refresh_session(
        &mut self,
        id: &SessionId,
        now: Instant,
    ) -> Result<(), EngineError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.clone()))?;
        session.refresh(now);
        Ok(())
    }

    /// Returns a deep copy of one session.
    pub(crate) fn get_session(&self, id: &SessionId) -> Result<Session, EngineError> {
        self.sessions
            .get(id)
            .map(|record| self.session_view(record))
            .ok_or_else(|| EngineError::SessionNotFound(id.clone()))
    }

    // -- Ticket operations -------------------------------------------------

    /// Issues (or re-issues) a ticket against a ticket-bearing resource.
    ///
    /// Re-issuing an existing name is a *takeover*: the new record
    /// replaces the old one and inherits its claimant, so an issuing
    /// service can hand off a ticket without forcing the claimant to
    /// drop work. The previous issuer's stale key no longer resolves to
    /// a ticket it issued, so nothing of the old issuance survives.
    pub(crate) fn issue_ticket(
        &mut self,
        id: &SessionId,
        resource: &str,
        name: &str,
        data: Vec<u8>,
        now: Instant,
    ) -> Result<(), EngineError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.clone()))?;
        // Issuing counts as liveness: the issuer keeps its own session
        // alive just by producing tickets.
        session.refresh(now);

        if let Some(existing) = self.resources.get(resource) {
            if existing.is_lock {
                return Err(EngineError::WrongResourceType(resource.to_string()));
            }
        }
        let res = self
            .resources
            .entry(resource.to_string())
            .or_insert_with(|| ResourceRecord::new(resource.to_string(), false));

        let mut ticket = TicketRecord {
            name: name.to_string(),
            resource_name: resource.to_string(),
            data,
            issuer: Some(id.clone()),
            claimant: None,
        };
        if let Some(old) = res.tickets.get(name) {
            ticket.claimant = old.claimant.clone();
            tracing::debug!(resource, ticket = name, "ticket takeover");
        }
        res.tickets.insert(name.to_string(), ticket);

        let session = self.sessions.get_mut(id).expect("session checked above");
        add_key(
            &mut session.issued,
            TicketKey {
                resource: resource.to_string(),
                ticket: name.to_string(),
            },
        );
        tracing::debug!(session = %id, resource, ticket = name, "ticket issued");
        Ok(())
    }

    /// Deletes a ticket. Any session may revoke, not just the issuer.
    pub(crate) fn revoke_ticket(
        &mut self,
        id: &SessionId,
        resource: &str,
        name: &str,
    ) -> Result<(), EngineError> {
        let State {
            sessions,
            resources,
        } = self;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.clone()))?;
        let res = resources
            .get_mut(resource)
            .ok_or_else(|| EngineError::ResourceNotFound(resource.to_string()))?;
        if res.tickets.remove(name).is_none() {
            return Err(EngineError::UnknownTicket {
                resource: resource.to_string(),
                ticket: name.to_string(),
            });
        }
        remove_key(
            &mut session.issued,
            &TicketKey {
                resource: resource.to_string(),
                ticket: name.to_string(),
            },
        );
        tracing::debug!(session = %id, resource, ticket = name, "ticket revoked");
        Ok(())
    }

    /// Claims the first available ticket on a resource.
    ///
    /// `Ok(None)`, not an error, when the resource doesn't exist or no
    /// ticket is available, so claimants can poll optimistically. A
    /// ticket is available when it has a live issuer and either no
    /// claimant or this same session (re-claim returns the same ticket).
    /// Scan order over the ticket table is unspecified.
    pub(crate) fn claim_ticket(
        &mut self,
        id: &SessionId,
        resource: &str,
    ) -> Result<Option<Ticket>, EngineError> {
        let State {
            sessions,
            resources,
        } = self;
        if !sessions.contains_key(id) {
            return Err(EngineError::SessionNotFound(id.clone()));
        }
        let Some(res) = resources.get_mut(resource) else {
            return Ok(None);
        };
        if res.is_lock {
            return Err(EngineError::WrongResourceType(resource.to_string()));
        }

        let candidate = res.tickets.values_mut().find(|t| {
            t.issuer.is_some() && (t.claimant.is_none() || t.claimant.as_ref() == Some(id))
        });
        let Some(ticket) = candidate else {
            return Ok(None);
        };

        ticket.claimant = Some(id.clone());
        let view = ticket_view(sessions, ticket);
        let key = TicketKey {
            resource: resource.to_string(),
            ticket: ticket.name.clone(),
        };
        let session = sessions.get_mut(id).expect("session checked above");
        add_key(&mut session.claimed, key);
        tracing::debug!(session = %id, resource, ticket = %view.name, "ticket claimed");
        Ok(Some(view))
    }

    /// Releases a claimed ticket. Releasing a ticket this session does
    /// not hold (or that no longer exists) is a silent no-op; clients
    /// double-release during failover and that must stay harmless.
    pub(crate) fn release_ticket(
        &mut self,
        id: &SessionId,
        resource: &str,
        name: &str,
    ) -> Result<(), EngineError> {
        let State {
            sessions,
            resources,
        } = self;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.clone()))?;
        let res = resources
            .get_mut(resource)
            .ok_or_else(|| EngineError::ResourceNotFound(resource.to_string()))?;
        if let Some(ticket) = res.tickets.get_mut(name) {
            if ticket.claimant.as_ref() == Some(id) {
                ticket.claimant = None;
                remove_key(
                    &mut session.claimed,
                    &TicketKey {
                        resource: resource.to_string(),
                        ticket: name.to_string(),
                    },
                );
                tracing::debug!(session = %id, resource, ticket = name, "ticket released");
            }
        }
        Ok(())
    }

    /// `true` iff the named ticket exists and this session claims it.
    pub(crate) fn has_ticket(
        &self,
        id: &SessionId,
        resource: &str,
        name: &str,
    ) -> Result<bool, EngineError> {
        if !self.sessions.contains_key(id) {
            return Err(EngineError::SessionNotFound(id.clone()));
        }
        let res = self
            .resources
            .get(resource)
            .ok_or_else(|| EngineError::ResourceNotFound(resource.to_string()))?;
        Ok(res
            .tickets
            .get(name)
            .is_some_and(|t| t.claimant.as_ref() == Some(id)))
    }

    // -- Lock operations ---------------------------------------------------

    /// Takes (or re-takes) the exclusive lock on a lockable resource.
    ///
    /// A lock is a single ticket named after the resource, with the
    /// holder recorded as issuer and no claimant. Returns `Ok(false)`,
    /// not an error, when another session holds the lock.
    pub(crate) fn lock(&mut self, id: &SessionId, resource: &str) -> Result<bool, EngineError> {
        let State {
            sessions,
            resources,
        } = self;
        if !sessions.contains_key(id) {
            return Err(EngineError::SessionNotFound(id.clone()));
        }
        if let Some(existing) = resources.get(resource) {
            if !existing.is_lock {
                return Err(EngineError::WrongResourceType(resource.to_string()));
            }
        }
        let res = resources
            .entry(resource.to_string())
            .or_insert_with(|| ResourceRecord::new(resource.to_string(), true));

        // Shape check: a lock resource holds nothing, or exactly the
        // one ticket named after itself.
        if res.tickets.len() > 1
            || (res.tickets.len() == 1 && !res.tickets.contains_key(resource))
        {
            return Err(EngineError::Malformed(resource.to_string()));
        }

        match res.tickets.get(resource) {
            None => {
                res.tickets.insert(
                    resource.to_string(),
                    TicketRecord {
                        name: resource.to_string(),
                        resource_name: resource.to_string(),
                        data: Vec::new(),
                        issuer: Some(id.clone()),
                        claimant: None,
                    },
                );
                let session = sessions.get_mut(id).expect("session checked above");
                add_key(
                    &mut session.issued,
                    TicketKey {
                        resource: resource.to_string(),
                        ticket: resource.to_string(),
                    },
                );
                tracing::debug!(session = %id, resource, "lock acquired");
                Ok(true)
            }
            // Re-locking a lock we already hold succeeds without
            // duplicating the issuance entry.
            Some(t) if t.issuer.as_ref() == Some(id) => Ok(true),
            Some(_) => Ok(false),
        }
    }

    /// Releases the lock. Only the holder may unlock.
    pub(crate) fn unlock(&mut self, id: &SessionId, resource: &str) -> Result<(), EngineError> {
        let State {
            sessions,
            resources,
        } = self;
        if !sessions.contains_key(id) {
            return Err(EngineError::SessionNotFound(id.clone()));
        }
        let res = resources
            .get_mut(resource)
            .ok_or_else(|| EngineError::ResourceNotFound(resource.to_string()))?;
        if !res.is_lock {
            return Err(EngineError::WrongResourceType(resource.to_string()));
        }
        let Some(ticket) = res.tickets.get(resource) else {
            return Err(EngineError::LockNotFound(resource.to_string()));
        };
        if ticket.issuer.as_ref() != Some(id) {
            return Err(EngineError::NotHolder {
                session: id.clone(),
                resource: resource.to_string(),
            });
        }
        res.tickets.remove(resource);
        let session = sessions.get_mut(id).expect("session checked above");
        remove_key(
            &mut session.issued,
            &TicketKey {
                resource: resource.to_string(),
                ticket: resource.to_string(),
            },
        );
        tracing::debug!(session = %id, resource, "lock released");
        Ok(())
    }

    // -- Expiration --------------------------------------------------------

    /// One pass of the expiration sweep.
    ///
    /// Order matters: sessions die first (releasing their claims and
    /// invalidating their issuances), then issuer-less tickets are
    /// purged, then emptied resources are collected, which also frees
    /// lock resource names for reuse.
    pub(crate) fn sweep(&mut self, now: Instant) {
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.expires_at < now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(s) = self.sessions.get(&id) {
                tracing::info!(session = %id, name = %s.name, ttl_ms = s.ttl_ms, "session expired");
            }
            self.clear_claims(&id);
            self.sessions.remove(&id);
        }

        for res in self.resources.values_mut() {
            res.tickets.retain(|_, t| t.issuer.is_some());
        }
        self.resources.retain(|_, r| !r.tickets.is_empty());
    }

    /// Detaches a session from every ticket it touches: claims are
    /// released, issuances invalidated, both sequences emptied.
    ///
    /// Each key is resolved against the *current* resource table before
    /// anything is written: a stale key (its ticket replaced by a
    /// takeover, or the whole table swapped by a snapshot reload) must
    /// not clobber someone else's ticket.
    fn clear_claims(&mut self, id: &SessionId) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        let claimed = std::mem::take(&mut session.claimed);
        let issued = std::mem::take(&mut session.issued);

        for key in claimed {
            if let Some(ticket) = ticket_mut(&mut self.resources, &key) {
                if ticket.claimant.as_ref() == Some(id) {
                    ticket.claimant = None;
                }
            }
        }
        for key in issued {
            if let Some(ticket) = ticket_mut(&mut self.resources, &key) {
                if ticket.issuer.as_ref() == Some(id) {
                    ticket.issuer = None;
                }
            }
        }
    }

    // -- Introspection -----------------------------------------------------

    /// Deep copy of the whole session table.
    pub(crate) fn sessions_view(&self) -> HashMap<SessionId, Session> {
        self.sessions
            .iter()
            .map(|(id, record)| (id.clone(), self.session_view(record)))
            .collect()
    }

    /// Deep copy of the whole resource table.
    pub(crate) fn resources_view(&self) -> HashMap<String, Resource> {
        self.resources
            .iter()
            .map(|(name, record)| (name.clone(), self.resource_view(record)))
            .collect()
    }

    /// Deep copy of a single resource, if it exists.
    pub(crate) fn one_resource_view(&self, name: &str) -> Option<Resource> {
        self.resources.get(name).map(|r| self.resource_view(r))
    }

    fn resource_view(&self, record: &ResourceRecord) -> Resource {
        Resource {
            name: record.name.clone(),
            is_lock: record.is_lock,
            tickets: record
                .tickets
                .iter()
                .map(|(name, t)| (name.clone(), ticket_view(&self.sessions, t)))
                .collect(),
        }
    }

    /// Builds the caller-visible copy of a session. Ticket keys are
    /// resolved at this moment; entries that no longer belong to the
    /// session (revoked, or taken over by another issuer) are omitted.
    fn session_view(&self, record: &SessionRecord) -> Session {
        let claimed = record
            .claimed
            .iter()
            .filter_map(|key| self.ticket_at(key))
            .filter(|t| t.claimant.as_ref() == Some(&record.id))
            .map(|t| ticket_view(&self.sessions, t))
            .collect();
        let issued = record
            .issued
            .iter()
            .filter_map(|key| self.ticket_at(key))
            .filter(|t| t.issuer.is_none() || t.issuer.as_ref() == Some(&record.id))
            .map(|t| ticket_view(&self.sessions, t))
            .collect();
        Session {
            id: record.id.clone(),
            name: record.name.clone(),
            src: record.src.clone(),
            ttl_ms: record.ttl_ms,
            claimed,
            issued,
        }
    }

    fn ticket_at(&self, key: &TicketKey) -> Option<&TicketRecord> {
        self.resources.get(&key.resource)?.tickets.get(&key.ticket)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ticket_mut<'a>(
    resources: &'a mut HashMap<String, ResourceRecord>,
    key: &TicketKey,
) -> Option<&'a mut TicketRecord> {
    resources.get_mut(&key.resource)?.tickets.get_mut(&key.ticket)
}

/// Copies one ticket, embedding issuer/claimant as session stubs
/// (sequences emptied) to break the cycle and bound the copy.
fn ticket_view(sessions: &HashMap<SessionId, SessionRecord>, t: &TicketRecord) -> Ticket {
    Ticket {
        name: t.name.clone(),
        resource_name: t.resource_name.clone(),
        data: t.data.clone(),
        issuer: t
            .issuer
            .as_ref()
            .and_then(|sid| sessions.get(sid))
            .map(|s| Box::new(record_stub(s))),
        claimant: t
            .claimant
            .as_ref()
            .and_then(|sid| sessions.get(sid))
            .map(|s| Box::new(record_stub(s))),
    }
}

fn record_stub(s: &SessionRecord) -> Session {
    Session {
        id: s.id.clone(),
        name: s.name.clone(),
        src: s.src.clone(),
        ttl_ms: s.ttl_ms,
        claimed: Vec::new(),
        issued: Vec::new(),
    }
}

/// Adds a key if not already present (identity by `(resource, ticket)`).
fn add_key(keys: &mut Vec<TicketKey>, key: TicketKey) {
    if !keys.contains(&key) {
        keys.push(key);
    }
}

fn remove_key(keys: &mut Vec<TicketKey>, key: &TicketKey) {
    keys.retain(|k| k != key);
}

// =========================================================================
// Tests
// =========================================================================
