//! The snapshotter: a periodic task that dumps engine state to disk.
//!
//! Runs beside the engine, not inside it. Each interval it pulls the
//! two introspection views through the engine handle (two serialized
//! reads) and writes the files on a blocking thread, so the engine never
//! waits on disk I/O.

use std::path::PathBuf;
use std::time::Duration;

use claimd_engine::{EngineError, EngineHandle};
use claimd_model::Codec;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::files;

/// Default interval between snapshots.
pub const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 1000;

/// Handle to a running snapshotter task.
pub struct SnapshotterHandle {
    stop: mpsc::Sender<oneshot::Sender<()>>,
}

impl SnapshotterHandle {
    /// Stops the snapshotter and waits for it to drain.
    ///
    /// A write already in progress completes; no further timer-driven
    /// writes start. Resolves once the task has confirmed it exited.
    pub async fn stop(self) {
        let (confirm_tx, confirm_rx) = oneshot::channel();
        if self.stop.send(confirm_tx).await.is_ok() {
            let _ = confirm_rx.await;
        }
    }
}

/// Spawns the snapshot loop.
pub fn spawn<C: Codec + Clone>(
    engine: EngineHandle,
    dir: PathBuf,
    interval_ms: u64,
    codec: C,
) -> SnapshotterHandle {
    let (stop_tx, stop_rx) = mpsc::channel(1);
    tokio::spawn(run(engine, dir, interval_ms.max(1), codec, stop_rx));
    SnapshotterHandle { stop: stop_tx }
}

async fn run<C: Codec + Clone>(
    engine: EngineHandle,
    dir: PathBuf,
    interval_ms: u64,
    codec: C,
    mut stop: mpsc::Receiver<oneshot::Sender<()>>,
) {
    let period = Duration::from_millis(interval_ms);
    // First snapshot after one full interval, like every later one.
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(dir = %dir.display(), interval_ms, "snapshot loop starting");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = snapshot_once(&engine, &dir, &codec).await {
                    tracing::warn!(error = %e, "unable to snapshot");
                }
            }
            confirm = stop.recv() => {
                tracing::info!("snapshot loop stopping");
                if let Some(confirm) = confirm {
                    let _ = confirm.send(());
                }
                break;
            }
        }
    }
}

/// One snapshot pass: read both views, then write both files.
///
/// The two reads are separate engine commands, so the pair can straddle
/// a mutation; snapshot consistency across the two files is explicitly
/// best-effort, and the restore path rejects pairs that don't line up.
async fn snapshot_once<C: Codec + Clone>(
    engine: &EngineHandle,
    dir: &PathBuf,
    codec: &C,
) -> Result<(), SnapshotFault> {
    let sessions = engine.sessions().await?;
    let resources = engine.resources().await?;

    let dir = dir.clone();
    let codec = codec.clone();
    tokio::task::spawn_blocking(move || {
        files::write_snapshot(&dir, &sessions, &resources, &codec)
    })
    .await
    .map_err(|_| SnapshotFault::WriterGone)??;
    Ok(())
}

/// Internal failure reasons for one snapshot pass.
#[derive(Debug, thiserror::Error)]
enum SnapshotFault {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Files(#[from] crate::SnapshotError),
    #[error("snapshot writer task aborted")]
    WriterGone,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use claimd_engine::{Engine, EngineConfig};
    use claimd_model::JsonCodec;

    // Real (unpaused) time: the write path hops through a blocking
    // thread, which the virtual clock can't see. Intervals are short,
    // so the tests stay fast.

    #[tokio::test]
    async fn test_snapshotter_writes_periodically() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _join) = Engine::spawn(EngineConfig::default());
        let id = engine.open_session("snap", "ANY", 60_000).await.unwrap();
        engine
            .issue_ticket(&id, "queue", "job", b"x".to_vec())
            .await
            .unwrap();

        let snapshotter = spawn(engine.clone(), dir.path().to_path_buf(), 50, JsonCodec);
        tokio::time::sleep(Duration::from_millis(300)).await;
        snapshotter.stop().await;

        let (sessions, resources) = files::load_snapshot(dir.path(), &JsonCodec)
            .unwrap()
            .expect("snapshot pair should exist");
        assert!(sessions.contains_key(&id));
        assert!(resources.contains_key("queue"));
    }

    #[tokio::test]
    async fn test_stop_confirms_and_halts_writes() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _join) = Engine::spawn(EngineConfig::default());

        let snapshotter = spawn(engine.clone(), dir.path().to_path_buf(), 50, JsonCodec);
        tokio::time::sleep(Duration::from_millis(120)).await;
        snapshotter.stop().await;

        // No further writes after stop returns.
        let before = std::fs::metadata(dir.path().join("sessions.jsonl"))
            .unwrap()
            .modified()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let after = std::fs::metadata(dir.path().join("sessions.jsonl"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_snapshotter_survives_engine_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, join) = Engine::spawn(EngineConfig::default());
        let snapshotter = spawn(engine.clone(), dir.path().to_path_buf(), 50, JsonCodec);

        engine.shutdown().await.unwrap();
        join.await.unwrap();

        // Ticks now fail against a gone engine; the loop logs and keeps
        // going until told to stop.
        tokio::time::sleep(Duration::from_millis(150)).await;
        snapshotter.stop().await;
    }
}
