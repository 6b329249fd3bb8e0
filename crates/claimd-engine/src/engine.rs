//! The engine actor: one Tokio task that owns all coordination state.
//!
//! Every mutation and every cross-entity read is a command sent over an
//! mpsc channel and executed by this single task, in arrival order.
//! That is the whole concurrency story: operations are linearizable
//! because exactly one task ever touches the state, and no command
//! observes another command half-applied.
//!
//! The same loop also runs the expiration sweep (a `tokio::select!`
//! branch on an interval timer), so expiry is serialized with
//! everything else.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use claimd_model::{Resource, Session, SessionId, Ticket};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{EngineError, RestoreError};
use crate::state::State;

/// Default interval between expiration sweeps.
pub const DEFAULT_EXPIRE_TICK_MS: u64 = 1000;

/// Command channel size. Producers that outrun the writer by more than
/// this backlog wait at submission.
const COMMAND_CHANNEL_SIZE: usize = 64;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Milliseconds between expiration sweeps.
    pub expire_tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            expire_tick_ms: DEFAULT_EXPIRE_TICK_MS,
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Operations submitted to the engine task.
///
/// Each variant carries a `oneshot::Sender` reply channel; the caller
/// blocks on it, so a reply doubles as the completion signal.
enum EngineCommand {
    OpenSession {
        name: String,
        src: String,
        ttl_ms: u64,
        reply: oneshot::Sender<SessionId>,
    },
    CloseSession {
        id: SessionId,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    RefreshSession {
        id: SessionId,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    GetSession {
        id: SessionId,
        reply: oneshot::Sender<Result<Session, EngineError>>,
    },
    IssueTicket {
        id: SessionId,
        resource: String,
        name: String,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    RevokeTicket {
        id: SessionId,
        resource: String,
        name: String,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    ClaimTicket {
        id: SessionId,
        resource: String,
        reply: oneshot::Sender<Result<Option<Ticket>, EngineError>>,
    },
    ReleaseTicket {
        id: SessionId,
        resource: String,
        name: String,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    HasTicket {
        id: SessionId,
        resource: String,
        name: String,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    Lock {
        id: SessionId,
        resource: String,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    Unlock {
        id: SessionId,
        resource: String,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    GetSessions {
        reply: oneshot::Sender<HashMap<SessionId, Session>>,
    },
    GetResources {
        reply: oneshot::Sender<HashMap<String, Resource>>,
    },
    GetResource {
        name: String,
        reply: oneshot::Sender<Option<Resource>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Constructors for the engine task.
pub struct Engine;

impl Engine {
    /// Spawns an engine with empty state.
    pub fn spawn(config: EngineConfig) -> (EngineHandle, JoinHandle<()>) {
        Self::spawn_with_state(config, State::default())
    }

    /// Spawns an engine pre-loaded from decoded snapshot tables.
    ///
    /// # Errors
    /// Returns the restore error when the snapshot pair is internally
    /// inconsistent; the caller should log it and fall back to
    /// [`Engine::spawn`] with empty state.
    pub fn spawn_restored(
        config: EngineConfig,
        sessions: HashMap<SessionId, Session>,
        resources: HashMap<String, Resource>,
    ) -> Result<(EngineHandle, JoinHandle<()>), RestoreError> {
        let state = State::restore(sessions, resources, Instant::now())?;
        tracing::info!(
            sessions = state.sessions.len(),
            resources = state.resources.len(),
            "state restored from snapshot"
        );
        Ok(Self::spawn_with_state(config, state))
    }

    fn spawn_with_state(config: EngineConfig, state: State) -> (EngineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let actor = EngineActor {
            state,
            receiver: rx,
            expire_tick: Duration::from_millis(config.expire_tick_ms.max(1)),
        };
        let join = tokio::spawn(actor.run());
        (EngineHandle { sender: tx }, join)
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle for submitting operations to a running engine.
///
/// Cheap to clone (it's an `mpsc::Sender` wrapper). Every method sends
/// one command and awaits its reply. [`EngineError::Unavailable`] means
/// the engine is gone (shut down) or dropped the reply (the command hit
/// a fault); either way the caller cannot know whether the operation
/// took effect.
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    async fn submit<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| EngineError::Unavailable)?;
        rx.await.map_err(|_| EngineError::Unavailable)
    }

    /// Opens a session and returns its generated id.
    pub async fn open_session(
        &self,
        name: &str,
        src: &str,
        ttl_ms: u64,
    ) -> Result<SessionId, EngineError> {
        self.submit(|reply| EngineCommand::OpenSession {
            name: name.to_string(),
            src: src.to_string(),
            ttl_ms,
            reply,
        })
        .await
    }

    /// Closes a session, releasing its claims and issuances.
    pub async fn close_session(&self, id: &SessionId) -> Result<(), EngineError> {
        self.submit(|reply| EngineCommand::CloseSession {
            id: id.clone(),
            reply,
        })
        .await?
    }

    /// Extends a session's deadline by its TTL.
    pub async fn refresh_session(&self, id: &SessionId) -> Result<(), EngineError> {
        self.submit(|reply| EngineCommand::RefreshSession {
            id: id.clone(),
            reply,
        })
        .await?
    }

    /// Returns a deep copy of a session.
    pub async fn get_session(&self, id: &SessionId) -> Result<Session, EngineError> {
        self.submit(|reply| EngineCommand::GetSession {
            id: id.clone(),
            reply,
        })
        .await?
    }

    /// Issues (or takes over) a named ticket on a ticket-bearing
    /// resource, creating the resource if needed.
    pub async fn issue_ticket(
        &self,
        id: &SessionId,
        resource: &str,
        name: &str,
        data: Vec<u8>,
    ) -> Result<(), EngineError> {
        self.submit(|reply| EngineCommand::IssueTicket {
            id: id.clone(),
            resource: resource.to_string(),
            name: name.to_string(),
            data,
            reply,
        })
        .await?
    }

    /// Deletes a ticket regardless of who issued it.
    pub async fn revoke_ticket(
        &self,
        id: &SessionId,
        resource: &str,
        name: &str,
    ) -> Result<(), EngineError> {
        self.submit(|reply| EngineCommand::RevokeTicket {
            id: id.clone(),
            resource: resource.to_string(),
            name: name.to_string(),
            reply,
        })
        .await?
    }

    /// Claims an available ticket, if any. `Ok(None)` means nothing is
    /// available right now; poll again later.
    pub async fn claim_ticket(
        &self,
        id: &SessionId,
        resource: &str,
    ) -> Result<Option<Ticket>, EngineError> {
        self.submit(|reply| EngineCommand::ClaimTicket {
            id: id.clone(),
            resource: resource.to_string(),
            reply,
        })
        .await?
    }

    /// Releases a claimed ticket (no-op if not held by this session).
    pub async fn release_ticket(
        &self,
        id: &SessionId,
        resource: &str,
        name: &str,
    ) -> Result<(), EngineError> {
        self.submit(|reply| EngineCommand::ReleaseTicket {
            id: id.clone(),
            resource: resource.to_string(),
            name: name.to_string(),
            reply,
        })
        .await?
    }

    /// `true` iff this session currently claims the named ticket.
    pub async fn has_ticket(
        &self,
        id: &SessionId,
        resource: &str,
        name: &str,
    ) -> Result<bool, EngineError> {
        self.submit(|reply| EngineCommand::HasTicket {
            id: id.clone(),
            resource: resource.to_string(),
            name: name.to_string(),
            reply,
        })
        .await?
    }

    /// Acquires the exclusive lock on a lockable resource. `Ok(false)`
    /// means another session holds it.
    pub async fn lock(&self, id: &SessionId, resource: &str) -> Result<bool, EngineError> {
        self.submit(|reply| EngineCommand::Lock {
            id: id.clone(),
            resource: resource.to_string(),
            reply,
        })
        .await?
    }

    /// Releases the lock held by this session.
    pub async fn unlock(&self, id: &SessionId, resource: &str) -> Result<(), EngineError> {
        self.submit(|reply| EngineCommand::Unlock {
            id: id.clone(),
            resource: resource.to_string(),
            reply,
        })
        .await?
    }

    /// Deep copy of the session table.
    pub async fn sessions(&self) -> Result<HashMap<SessionId, Session>, EngineError> {
        self.submit(|reply| EngineCommand::GetSessions { reply }).await
    }

    /// Deep copy of the resource table.
    pub async fn resources(&self) -> Result<HashMap<String, Resource>, EngineError> {
        self.submit(|reply| EngineCommand::GetResources { reply })
            .await
    }

    /// Deep copy of one resource, if present.
    pub async fn resource(&self, name: &str) -> Result<Option<Resource>, EngineError> {
        self.submit(|reply| EngineCommand::GetResource {
            name: name.to_string(),
            reply,
        })
        .await
    }

    /// Stops the engine task. Resolves once the task has confirmed it
    /// is exiting; commands queued behind the shutdown are dropped.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.submit(|reply| EngineCommand::Shutdown { reply }).await
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct EngineActor {
    state: State,
    receiver: mpsc::Receiver<EngineCommand>,
    expire_tick: Duration,
}

impl EngineActor {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.expire_tick);
        // A delayed sweep just runs late; there is nothing to catch up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(expire_tick_ms = self.expire_tick.as_millis() as u64, "engine started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.state.sweep(Instant::now());
                }
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else {
                        // Every handle dropped; nobody can reach us.
                        break;
                    };
                    let cmd = match cmd {
                        EngineCommand::Shutdown { reply } => {
                            tracing::info!("engine shutting down");
                            let _ = reply.send(());
                            break;
                        }
                        other => other,
                    };
                    // A panic inside a command is a bug, but it must not
                    // take the daemon down: log it, drop the poisoned
                    // state, and keep serving from empty. The caller's
                    // reply channel dies with the command, surfacing as
                    // `Unavailable` on their side.
                    let applied = std::panic::catch_unwind(AssertUnwindSafe(|| {
                        self.state.apply(cmd);
                    }));
                    if let Err(panic) = applied {
                        let msg = panic_message(panic.as_ref());
                        let backtrace = std::backtrace::Backtrace::force_capture();
                        tracing::error!(
                            panic = %msg,
                            %backtrace,
                            "engine command panicked; restarting with empty state"
                        );
                        self.state = State::default();
                    }
                }
            }
        }

        tracing::info!("engine stopped");
    }
}

impl State {
    /// Executes one command against the state and sends the reply.
    /// Send failures are ignored: the caller gave up waiting, but the
    /// operation has already taken effect and stays effective.
    fn apply(&mut self, cmd: EngineCommand) {
        let now = Instant::now();
        match cmd {
            EngineCommand::OpenSession {
                name,
                src,
                ttl_ms,
                reply,
            } => {
                let _ = reply.send(self.open_session(&name, &src, ttl_ms, now));
            }
            EngineCommand::CloseSession { id, reply } => {
                let _ = reply.send(self.close_session(&id));
            }
            EngineCommand::RefreshSession { id, reply } => {
                let _ = reply.send(self.refresh_session(&id, now));
            }
            EngineCommand::GetSession { id, reply } => {
                let _ = reply.send(self.get_session(&id));
            }
            EngineCommand::IssueTicket {
                id,
                resource,
                name,
                data,
                reply,
            } => {
                let _ = reply.send(self.issue_ticket(&id, &resource, &name, data, now));
            }
            EngineCommand::RevokeTicket {
                id,
                resource,
                name,
                reply,
            } => {
                let _ = reply.send(self.revoke_ticket(&id, &resource, &name));
            }
            EngineCommand::ClaimTicket {
                id,
                resource,
                reply,
            } => {
                let _ = reply.send(self.claim_ticket(&id, &resource));
            }
            EngineCommand::ReleaseTicket {
                id,
                resource,
                name,
                reply,
            } => {
                let _ = reply.send(self.release_ticket(&id, &resource, &name));
            }
            EngineCommand::HasTicket {
                id,
                resource,
                name,
                reply,
            } => {
                let _ = reply.send(self.has_ticket(&id, &resource, &name));
            }
            EngineCommand::Lock { id, resource, reply } => {
                let _ = reply.send(self.lock(&id, &resource));
            }
            EngineCommand::Unlock { id, resource, reply } => {
                let _ = reply.send(self.unlock(&id, &resource));
            }
            EngineCommand::GetSessions { reply } => {
                let _ = reply.send(self.sessions_view());
            }
            EngineCommand::GetResources { reply } => {
                let _ = reply.send(self.resources_view());
            }
            EngineCommand::GetResource { name, reply } => {
                let _ = reply.send(self.one_resource_view(&name));
            }
            EngineCommand::Shutdown { .. } => {
                unreachable!("shutdown is intercepted by the actor loop")
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
