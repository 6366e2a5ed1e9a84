// CLI entry point for the chess table server.
//
// Starts a standalone server that clients connect to over TCP. See
// `server.rs` for the networking architecture and `session.rs` for seat and
// move handling.
//
// The server runs on its own threads. The main thread only waits for SIGINT
// or SIGTERM (Ctrl+C on other platforms) on a small tokio runtime, then
// stops the server so every client socket is closed cleanly.
//
// Usage:
//   table-server [OPTIONS]
//     --host <HOST>     Bind address (default: 127.0.0.1)
//     --port <PORT>     Listen port (default: 3000, or $PORT)
//     --fen <FEN>       Start from this position instead of the standard one
//     -v, --verbose     Debug logging (RUST_LOG overrides)

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use chess_table_server::logging::init_logging;
use chess_table_server::server::{ServerConfig, start_server};

#[derive(Debug, Parser)]
#[command(name = "table-server", version, about = "Two-seat chess table server")]
struct Cli {
    /// Bind address.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Listen port.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Starting position as FEN.
    #[arg(long)]
    fen: Option<String>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            port: cli.port,
            starting_fen: cli.fen,
            ..Self::default()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let (handle, addr) = start_server(cli.into()).context("failed to start table server")?;
    info!(%addr, "press Ctrl+C to stop");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    runtime.block_on(wait_for_shutdown_signal())?;

    handle.stop();
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("received Ctrl+C, shutting down");
    Ok(())
}
