//! # claimd
//!
//! An in-memory coordination service that brokers shared access to
//! named resources: clients open TTL-bounded *sessions*, *issue* and
//! *claim* tickets against ticket-bearing resources, or take exclusive
//! *locks* on lockable ones. When a session's TTL lapses, everything it
//! issued is revoked and everything it claimed is freed. State can be
//! snapshotted to disk periodically and reloaded across restarts.
//!
//! This meta crate wires the pieces together and is all most consumers
//! need:
//!
//! ```rust,no_run
//! use claimd::prelude::*;
//!
//! # async fn example() -> Result<(), EngineError> {
//! let daemon = Claimd::builder().snapshot_path("./snaps").start();
//! let engine = daemon.handle();
//!
//! let issuer = engine.open_session("issuer", "local", 5000).await?;
//! engine.issue_ticket(&issuer, "jobs", "job-1", b"payload".to_vec()).await?;
//!
//! let worker = engine.open_session("worker", "local", 5000).await?;
//! if let Some(ticket) = engine.claim_ticket(&worker, "jobs").await? {
//!     // ... do the work, then:
//!     engine.release_ticket(&worker, "jobs", &ticket.name).await?;
//! }
//! daemon.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod daemon;
mod error;

pub use config::{ClaimdBuilder, Config};
pub use daemon::Claimd;
pub use error::ClaimdError;

/// Re-exports everything a consumer of the service needs.
pub mod prelude {
    // Meta crate
    pub use crate::{Claimd, ClaimdBuilder, ClaimdError, Config};

    // Model types
    pub use claimd_model::{
        Codec, JsonCodec, ModelError, Resource, Session, SessionId, Ticket,
    };

    // Engine
    pub use claimd_engine::{
        Engine, EngineConfig, EngineError, EngineHandle, RestoreError,
    };

    // Snapshots
    pub use claimd_snapshot::{SnapshotError, SnapshotterHandle};

    // HTTP transport
    pub use claimd_http::router;
}
