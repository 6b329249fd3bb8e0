//! Route handlers: thin adapters from HTTP to engine operations.
//!
//! The transport owns nothing. Every handler parses its inputs, calls
//! exactly one engine operation, and shapes the reply; the engine's
//! deep-copy views go straight out as JSON.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use claimd_engine::{EngineError, EngineHandle};
use claimd_model::{Resource, Session, SessionId, Ticket};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Ticket payloads are capped at the transport; the engine itself
/// imposes no limit.
pub const MAX_TICKET_DATA: usize = 1024;

/// TTL applied when the open-session request doesn't name one.
const DEFAULT_TTL_MS: u64 = 5000;

#[derive(Clone)]
pub(crate) struct AppState {
    engine: EngineHandle,
    started: Instant,
}

/// Builds the API router over an engine handle.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`,
/// since the open-session handler records the peer address as the
/// session's origin.
pub fn router(engine: EngineHandle) -> Router {
    let state = AppState {
        engine,
        started: Instant::now(),
    };
    Router::new()
        .route("/api/v1/sessions", post(open_session))
        .route(
            "/api/v1/sessions/{id}",
            get(get_session).put(refresh_session).delete(close_session),
        )
        .route(
            "/api/v1/tickets/{*resource}",
            post(issue_ticket).delete(revoke_ticket),
        )
        .route(
            "/api/v1/claims/{*resource}",
            post(claim_ticket).get(has_ticket).delete(release_ticket),
        )
        .route("/api/v1/locks/{*resource}", post(lock).delete(unlock))
        .route("/api/v1/dump/sessions", get(dump_sessions))
        .route("/api/v1/dump/resources", get(dump_resources))
        .route("/api/v1/dump/resources/{*resource}", get(dump_resource))
        .route("/api/v1/status", get(status))
        .layer(DefaultBodyLimit::max(MAX_TICKET_DATA))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query and response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OpenSessionQuery {
    name: Option<String>,
    ttl: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TicketQuery {
    sessid: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionOnlyQuery {
    sessid: Option<String>,
}

/// Reply for claim-shaped requests: whether the session holds a
/// ticket, and (on a successful claim) the ticket copy itself.
#[derive(Debug, Serialize)]
struct ClaimResponse {
    claimed: bool,
    ticket: Option<Ticket>,
}

#[derive(Debug, Serialize)]
struct LockResponse {
    locked: bool,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    version: &'static str,
    uptime_secs: u64,
    sessions: usize,
    resources: usize,
}

/// Rejects a missing or empty required query parameter.
fn require(value: Option<String>, param: &'static str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingParam(param))
}

// ---------------------------------------------------------------------------
// Session handlers
// ---------------------------------------------------------------------------

async fn open_session(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(q): Query<OpenSessionQuery>,
) -> Result<Json<SessionId>, ApiError> {
    let id = state
        .engine
        .open_session(
            q.name.as_deref().unwrap_or(""),
            &addr.to_string(),
            q.ttl.unwrap_or(DEFAULT_TTL_MS),
        )
        .await?;
    Ok(Json(id))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.engine.get_session(&SessionId(id)).await?))
}

async fn refresh_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<&'static str>, ApiError> {
    state.engine.refresh_session(&SessionId(id)).await?;
    Ok(Json("Ok"))
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<&'static str>, ApiError> {
    state.engine.close_session(&SessionId(id)).await?;
    Ok(Json("Ok"))
}

// ---------------------------------------------------------------------------
// Ticket handlers
// ---------------------------------------------------------------------------

async fn issue_ticket(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(q): Query<TicketQuery>,
    body: Bytes,
) -> Result<Json<&'static str>, ApiError> {
    let sessid = require(q.sessid, "sessid")?;
    let name = require(q.name, "name")?;
    state
        .engine
        .issue_ticket(&SessionId(sessid), &resource, &name, body.to_vec())
        .await?;
    Ok(Json("Ok"))
}

async fn revoke_ticket(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(q): Query<TicketQuery>,
) -> Result<Json<&'static str>, ApiError> {
    let sessid = require(q.sessid, "sessid")?;
    let name = require(q.name, "name")?;
    state
        .engine
        .revoke_ticket(&SessionId(sessid), &resource, &name)
        .await?;
    Ok(Json("Ok"))
}

async fn claim_ticket(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(q): Query<SessionOnlyQuery>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let sessid = require(q.sessid, "sessid")?;
    let ticket = state
        .engine
        .claim_ticket(&SessionId(sessid), &resource)
        .await?;
    Ok(Json(ClaimResponse {
        claimed: ticket.is_some(),
        ticket,
    }))
}

async fn release_ticket(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(q): Query<TicketQuery>,
) -> Result<Json<&'static str>, ApiError> {
    let sessid = require(q.sessid, "sessid")?;
    let name = require(q.name, "name")?;
    state
        .engine
        .release_ticket(&SessionId(sessid), &resource, &name)
        .await?;
    Ok(Json("Ok"))
}

async fn has_ticket(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(q): Query<TicketQuery>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let sessid = require(q.sessid, "sessid")?;
    let name = require(q.name, "name")?;
    let claimed = state
        .engine
        .has_ticket(&SessionId(sessid), &resource, &name)
        .await?;
    Ok(Json(ClaimResponse {
        claimed,
        ticket: None,
    }))
}

// ---------------------------------------------------------------------------
// Lock handlers
// ---------------------------------------------------------------------------

async fn lock(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(q): Query<SessionOnlyQuery>,
) -> Result<Json<LockResponse>, ApiError> {
    let sessid = require(q.sessid, "sessid")?;
    let locked = state.engine.lock(&SessionId(sessid), &resource).await?;
    Ok(Json(LockResponse { locked }))
}

async fn unlock(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(q): Query<SessionOnlyQuery>,
) -> Result<Json<&'static str>, ApiError> {
    let sessid = require(q.sessid, "sessid")?;
    state.engine.unlock(&SessionId(sessid), &resource).await?;
    Ok(Json("Ok"))
}

// ---------------------------------------------------------------------------
// Introspection handlers
// ---------------------------------------------------------------------------

async fn dump_sessions(
    State(state): State<AppState>,
) -> Result<Json<HashMap<SessionId, Session>>, ApiError> {
    Ok(Json(state.engine.sessions().await?))
}

async fn dump_resources(
    State(state): State<AppState>,
) -> Result<Json<HashMap<String, Resource>>, ApiError> {
    Ok(Json(state.engine.resources().await?))
}

async fn dump_resource(
    State(state): State<AppState>,
    Path(resource): Path<String>,
) -> Result<Json<Resource>, ApiError> {
    let found = state
        .engine
        .resource(&resource)
        .await?
        .ok_or(EngineError::ResourceNotFound(resource))?;
    Ok(Json(found))
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let sessions = state.engine.sessions().await?.len();
    let resources = state.engine.resources().await?.len();
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started.elapsed().as_secs(),
        sessions,
        resources,
    }))
}

// =========================================================================
// Tests
// =========================================================================
