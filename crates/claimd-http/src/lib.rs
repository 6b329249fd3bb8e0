//! HTTP/JSON transport for claimd.
//!
//! Maps `/api/v1` routes onto engine operations, nothing more. The
//! transport holds no state of its own beyond an [`EngineHandle`]
//! clone; every response body is one of the engine's deep-copy views
//! serialized as JSON.
//!
//! Error contract: the engine's not-found family becomes 404, malformed
//! requests become 400, everything else is a plain 500 with the error
//! text as the body.
//!
//! ```rust,no_run
//! # async fn serve(engine: claimd_engine::EngineHandle) -> std::io::Result<()> {
//! let app = claimd_http::router(engine);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8001").await?;
//! axum::serve(
//!     listener,
//!     app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
//! )
//! .await
//! # }
//! ```

mod error;
mod routes;

pub use error::ApiError;
pub use routes::{router, MAX_TICKET_DATA};
