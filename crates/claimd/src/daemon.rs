//! Daemon lifecycle: snapshot load, engine spawn, orderly shutdown.

use claimd_engine::{Engine, EngineConfig, EngineHandle};
use claimd_model::JsonCodec;
use claimd_snapshot::SnapshotterHandle;
use tokio::task::JoinHandle;

use crate::{Config, ClaimdBuilder};

/// A running claimd instance: the engine task plus, when configured,
/// the snapshotter task.
pub struct Claimd {
    handle: EngineHandle,
    engine_join: JoinHandle<()>,
    snapshotter: Option<SnapshotterHandle>,
}

impl Claimd {
    /// Creates a builder with default settings.
    pub fn builder() -> ClaimdBuilder {
        ClaimdBuilder::new()
    }

    /// Starts the daemon.
    ///
    /// When a snapshot directory is configured and holds a usable pair
    /// of files, the engine comes up with the restored state. Any load
    /// or restore problem is logged and the engine starts empty; a bad
    /// snapshot must never keep the service down. Must be called from
    /// within a Tokio runtime.
    pub fn start(config: Config) -> Claimd {
        let codec = JsonCodec;
        let engine_config = EngineConfig {
            expire_tick_ms: config.expire_tick_ms,
        };

        let restored = config
            .snapshot_path
            .as_deref()
            .and_then(|dir| match claimd_snapshot::load_snapshot(dir, &codec) {
                Ok(Some(tables)) => Some(tables),
                Ok(None) => {
                    tracing::info!(dir = %dir.display(), "no snapshot found; starting empty");
                    None
                }
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "snapshot unreadable; starting empty");
                    None
                }
            });

        let (handle, engine_join) = match restored {
            Some((sessions, resources)) => {
                match Engine::spawn_restored(engine_config.clone(), sessions, resources) {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "snapshot restore failed; starting empty");
                        Engine::spawn(engine_config)
                    }
                }
            }
            None => Engine::spawn(engine_config),
        };

        let snapshotter = config.snapshot_path.map(|dir| {
            claimd_snapshot::spawn(
                handle.clone(),
                dir,
                config.snapshot_interval_ms,
                codec,
            )
        });

        Claimd {
            handle,
            engine_join,
            snapshotter,
        }
    }

    /// A handle for submitting operations. Cheap to clone.
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Stops the daemon: the snapshotter drains first (an in-flight
    /// write completes), then the engine, and the call returns only
    /// once the engine task has actually exited.
    pub async fn shutdown(mut self) {
        if let Some(snapshotter) = self.snapshotter.take() {
            snapshotter.stop().await;
        }
        // Unavailable here just means the engine is already gone.
        let _ = self.handle.shutdown().await;
        let _ = self.engine_join.await;
        tracing::info!("claimd stopped");
    }
}
