//! Rebuilding engine state from decoded snapshot views.
//!
//! A snapshot stores the two tables as detached copies: every ticket
//! embeds its issuer/claimant as session *stubs*, and every session
//! embeds copies of the tickets it claims and issues. Restoring means
//! collapsing all those copies back onto one canonical record per
//! entity and re-establishing the id links between them.

use std::collections::HashMap;

use claimd_model::{Resource, Session, SessionId};
use tokio::time::Instant;

use crate::error::RestoreError;
use crate::state::{ResourceRecord, SessionRecord, State, TicketKey, TicketRecord};

impl State {
    /// Rebuilds authoritative state from snapshot views.
    ///
    /// The passes, in order:
    ///
    /// 1. Resources become records; embedded issuer/claimant stubs are
    ///    reduced to their ids.
    /// 2. Each session's `claimed`/`issued` copies are resolved to the
    ///    canonical ticket in the resource table (a missing resource or
    ///    ticket fails the whole restore), and the canonical ticket's
    ///    claimant/issuer is pointed back at the session.
    /// 3. Any remaining issuer/claimant id that names no live session is
    ///    dropped; the first sweep then purges the orphaned tickets.
    /// 4. Every deadline is refreshed so a restart doesn't instantly
    ///    expire everything that was restored.
    pub(crate) fn restore(
        sessions: HashMap<SessionId, Session>,
        resources: HashMap<String, Resource>,
        now: Instant,
    ) -> Result<State, RestoreError> {
        let mut state = State::default();

        for (name, resource) in resources {
            let tickets = resource
                .tickets
                .into_iter()
                .map(|(ticket_name, t)| {
                    (
                        ticket_name,
                        TicketRecord {
                            name: t.name,
                            resource_name: t.resource_name,
                            data: t.data,
                            issuer: t.issuer.map(|stub| stub.id),
                            claimant: t.claimant.map(|stub| stub.id),
                        },
                    )
                })
                .collect();
            state.resources.insert(
                name.clone(),
                ResourceRecord {
                    name,
                    is_lock: resource.is_lock,
                    tickets,
                },
            );
        }

        for (id, session) in sessions {
            let mut record = SessionRecord {
                id: id.clone(),
                name: session.name,
                src: session.src,
                ttl_ms: session.ttl_ms,
                expires_at: now,
                claimed: Vec::new(),
                issued: Vec::new(),
            };
            record.refresh(now);

            for ticket in session.claimed {
                let key = resolve(&state, &ticket.resource_name, &ticket.name)?;
                let canonical = state
                    .resources
                    .get_mut(&key.resource)
                    .expect("resolved above")
                    .tickets
                    .get_mut(&key.ticket)
                    .expect("resolved above");
                canonical.claimant = Some(id.clone());
                record.claimed.push(key);
            }
            for ticket in session.issued {
                let key = resolve(&state, &ticket.resource_name, &ticket.name)?;
                let canonical = state
                    .resources
                    .get_mut(&key.resource)
                    .expect("resolved above")
                    .tickets
                    .get_mut(&key.ticket)
                    .expect("resolved above");
                canonical.issuer = Some(id.clone());
                record.issued.push(key);
            }

            state.sessions.insert(id, record);
        }

        // Collapse leftover stub ids onto live sessions; anything that
        // doesn't resolve was owned by a session absent from the
        // snapshot and gets cleaned up by the sweep.
        let State {
            sessions,
            resources,
        } = &mut state;
        for resource in resources.values_mut() {
            for ticket in resource.tickets.values_mut() {
                if let Some(issuer) = &ticket.issuer {
                    if !sessions.contains_key(issuer) {
                        ticket.issuer = None;
                    }
                }
                if let Some(claimant) = &ticket.claimant {
                    if !sessions.contains_key(claimant) {
                        ticket.claimant = None;
                    }
                }
            }
        }

        Ok(state)
    }
}

/// Confirms the `(resource, ticket)` pair exists and returns its key.
fn resolve(
    state: &State,
    resource_name: &str,
    ticket_name: &str,
) -> Result<TicketKey, RestoreError> {
    let resource = state
        .resources
        .get(resource_name)
        .ok_or_else(|| RestoreError::MissingResource(resource_name.to_string()))?;
    if !resource.tickets.contains_key(ticket_name) {
        return Err(RestoreError::MissingTicket {
            resource: resource_name.to_string(),
            ticket: ticket_name.to_string(),
        });
    }
    Ok(TicketKey {
        resource: resource_name.to_string(),
        ticket: ticket_name.to_string(),
    })
}

// =========================================================================
// Tests
// =========================================================================
