//! Error-to-response mapping for the HTTP layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use claimd_engine::EngineError;

/// Errors surfaced by API handlers.
///
/// The engine's "not found" family maps to 404; every other engine
/// error is a generic 500; clients aren't expected to distinguish
/// further. Bad requests never reach the engine at all.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A required query parameter was missing or empty.
    #[error("missing required query parameter: {0}")]
    MissingParam(&'static str),

    /// The engine rejected the operation.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingParam(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::warn!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}
