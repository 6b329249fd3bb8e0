//! Daemon configuration.

use std::path::PathBuf;

use claimd_engine::DEFAULT_EXPIRE_TICK_MS;
use claimd_snapshot::DEFAULT_SNAPSHOT_INTERVAL_MS;

/// Configuration for a claimd instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Milliseconds between expiration sweeps.
    pub expire_tick_ms: u64,

    /// Snapshot directory. `None` disables snapshotting entirely:
    /// state lives and dies with the process.
    pub snapshot_path: Option<PathBuf>,

    /// Milliseconds between snapshots (ignored when snapshotting is
    /// disabled).
    pub snapshot_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            expire_tick_ms: DEFAULT_EXPIRE_TICK_MS,
            snapshot_path: None,
            snapshot_interval_ms: DEFAULT_SNAPSHOT_INTERVAL_MS,
        }
    }
}

/// Builder for configuring and starting a [`Claimd`](crate::Claimd).
///
/// # Example
///
/// ```rust,no_run
/// use claimd::Claimd;
///
/// # async fn start() {
/// let daemon = Claimd::builder()
///     .expire_tick_ms(500)
///     .snapshot_path("/var/lib/claimd/snaps")
///     .start();
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ClaimdBuilder {
    config: Config,
}

impl ClaimdBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expiration sweep interval.
    pub fn expire_tick_ms(mut self, ms: u64) -> Self {
        self.config.expire_tick_ms = ms;
        self
    }

    /// Enables snapshotting into the given directory.
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = Some(path.into());
        self
    }

    /// Sets the snapshot interval.
    pub fn snapshot_interval_ms(mut self, ms: u64) -> Self {
        self.config.snapshot_interval_ms = ms;
        self
    }

    /// Starts the daemon with this configuration.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> crate::Claimd {
        crate::Claimd::start(self.config)
    }
}
