//! SeriesVault Server Binary
//!
//! Main entry point for the SeriesVault TCP server

use clap::Parser;
use seriesvault::{Result, SeriesVaultServer, ServerConfig};
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{fmt, EnvFilter};

/// SeriesVault Server
#[derive(Parser, Debug)]
#[command(name = "seriesvault-server")]
#[command(about = "In-memory time-series store over TCP")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:10001")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1000")]
    max_connections: usize,

    /// Largest unterminated request buffered per connection, in bytes
    #[arg(long, default_value = "16777216")]
    max_request_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,seriesvault=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    let config = ServerConfig {
        bind_addr: args.listen,
        max_connections: args.max_connections,
        max_request_size: args.max_request_size,
    };

    // The store lives as long as the server that owns it
    let server = Arc::new(SeriesVaultServer::new(config));

    // Setup graceful shutdown on SIGINT (Ctrl+C)
    let server_clone = Arc::clone(&server);
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }

        tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        if let Err(e) = server_clone.shutdown() {
            tracing::error!("Failed to initiate shutdown: {}", e);
        }
    });

    server.run().await?;

    let store = server.store();
    tracing::info!(
        "Discarding {} series held in memory",
        store.len().await
    );
    Ok(())
}
