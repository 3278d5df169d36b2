//! SeriesVault TCP Server
//!
//! Accepts connections with tokio, hands each one a `Session` over the
//! shared store, and stops on a broadcast shutdown signal.

use crate::{
    error::{Result, SeriesVaultError},
    session::Session,
    store::SharedStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::{broadcast, OwnedSemaphorePermit, Semaphore},
};
use tracing::{debug, error, info, warn};

const READ_CHUNK: usize = 4096;

/// SeriesVault server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_connections: usize,
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:10001".to_string(),
            max_connections: 1000,
            max_request_size: 16 * 1024 * 1024,
        }
    }
}

/// SeriesVault TCP server
pub struct SeriesVaultServer {
    config: ServerConfig,
    store: SharedStore,
    limiter: Arc<Semaphore>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SeriesVaultServer {
    /// Create a server with a fresh, empty store
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, SharedStore::new())
    }

    /// Create a server over an existing store
    pub fn with_store(config: ServerConfig, store: SharedStore) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let limiter = Arc::new(Semaphore::new(config.max_connections));

        Self {
            config,
            store,
            limiter,
            shutdown_tx,
        }
    }

    /// Handle to the store every connection shares
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("SeriesVault server listening on {}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.spawn_client(stream, addr),
                        Err(e) => warn!("Failed to accept connection: {}", e),
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }

    fn spawn_client(&self, stream: TcpStream, addr: SocketAddr) {
        let permit = match Arc::clone(&self.limiter).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(
                    "Refusing {}: connection limit of {} reached",
                    addr, self.config.max_connections
                );
                return;
            }
        };

        debug!("New client connected: {}", addr);
        let session = Session::new(self.store.clone(), self.config.max_request_size);
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            if let Err(e) = Self::handle_client(stream, session, shutdown_rx, permit).await {
                error!("Error handling client {}: {}", addr, e);
            }
            debug!("Client disconnected: {}", addr);
        });
    }

    /// Pump bytes between one client and its session until either side closes
    async fn handle_client(
        mut stream: TcpStream,
        mut session: Session,
        mut shutdown_rx: broadcast::Receiver<()>,
        _permit: OwnedSemaphorePermit,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.split();
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            tokio::select! {
                result = reader.read(&mut chunk) => {
                    let n = result?;
                    if n == 0 {
                        if session.pending() > 0 {
                            debug!("Dropping {} bytes of unterminated request", session.pending());
                        }
                        break;
                    }

                    if let Some(response) = session.handle(&chunk[..n]).await {
                        writer.write_all(&response).await?;
                        writer.flush().await?;
                    }
                }

                _ = shutdown_rx.recv() => {
                    debug!("Shutdown signal received, closing client connection");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown_tx.send(()).map_err(|_| {
            SeriesVaultError::Server("Failed to send shutdown signal".to_string())
        })?;
        Ok(())
    }
}
