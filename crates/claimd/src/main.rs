//! The claimd daemon binary: flags, logging, HTTP serving, shutdown.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use claimd::{Claimd, ClaimdError};

#[derive(Debug, Parser)]
#[command(name = "claimd", version, about = "In-memory ticket and lock coordination daemon")]
struct Args {
    /// Address and port to listen on.
    #[arg(short = 'l', long, default_value = "0.0.0.0:8001")]
    listen: SocketAddr,

    /// Snapshot directory. Omit to disable snapshotting.
    #[arg(long)]
    snap_path: Option<PathBuf>,

    /// Expiration sweep interval in milliseconds.
    #[arg(long, default_value_t = 1000)]
    expire_ms: u64,

    /// Snapshot interval in milliseconds.
    #[arg(long, default_value_t = 1000)]
    snapshot_ms: u64,

    /// Log level: error, warn, info, debug, or trace.
    #[arg(long, default_value = "debug")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> Result<(), ClaimdError> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "claimd starting");

    let mut builder = Claimd::builder()
        .expire_tick_ms(args.expire_ms)
        .snapshot_interval_ms(args.snapshot_ms);
    if let Some(path) = args.snap_path {
        builder = builder.snapshot_path(path);
    }
    let daemon = builder.start();

    let app = claimd_http::router(daemon.handle());
    let listener = match tokio::net::TcpListener::bind(args.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %args.listen, error = %e, "unable to bind");
            return Err(e.into());
        }
    };
    tracing::info!(addr = %args.listen, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    daemon.shutdown().await;
    tracing::info!("done");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    {
        let mut term =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("install SIGTERM handler");
        tokio::select! {
            () = ctrl_c => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;

    tracing::info!("shutdown signal received");
}
