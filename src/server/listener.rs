//! Relay server listener
//!
//! Handles the TCP accept loop, drives the broadcaster's tick loop, and
//! spawns one connection task per viewer.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::discovery::Discovery;
use crate::error::{Error, Result};
use crate::server::broadcaster::Broadcaster;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::transport::SourceTransport;

/// WebSocket relay server
pub struct RelayServer {
    config: ServerConfig,
    broadcaster: Arc<Broadcaster>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Create a server around an existing broadcaster
    pub fn new(config: ServerConfig, broadcaster: Broadcaster) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            broadcaster: Arc::new(broadcaster),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Create a server with default discovery and broadcaster settings
    pub fn with_transport(config: ServerConfig, transport: Arc<dyn SourceTransport>) -> Self {
        Self::new(config, Broadcaster::new(Discovery::new(transport)))
    }

    /// Get a reference to the broadcaster
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        Ok(TcpListener::bind(self.config.bind_addr).await?)
    }

    /// Run the server
    ///
    /// This method blocks until the broadcaster shuts down or the tick loop
    /// fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serve viewers on an already bound listener
    ///
    /// When `shutdown` resolves, or the broadcaster is shut down directly,
    /// the tick loop stops, every open session is asked to close, and this
    /// returns `Ok`. A tick loop that dies on its own is an error.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(addr = %listener.local_addr()?, "Relay server listening");

        if self.config.discover_on_start {
            match self.broadcaster.discover().await {
                Ok(outcome) => {
                    tracing::info!(sources = outcome.total, "Startup discovery complete")
                }
                Err(e) => tracing::warn!(error = %e, "Startup discovery failed"),
            }
        }

        let mut tick_handle = self.broadcaster.spawn_tick_loop();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            joined = &mut tick_handle => match joined {
                Ok(()) if self.broadcaster.is_shutting_down() => {
                    tracing::info!("Broadcaster shut down");
                    Ok(())
                }
                joined => {
                    let reason = match joined {
                        Ok(()) => "tick loop exited".to_string(),
                        Err(e) => e.to_string(),
                    };
                    tracing::error!(reason = %reason, "Tick loop died");
                    Err(Error::TickLoop(reason))
                }
            },
            result = self.accept_loop(&listener) => result,
        };

        self.broadcaster.shutdown();
        if !tick_handle.is_finished() {
            let _ = tick_handle.await;
        }

        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let connection = Connection::new(
            session_id,
            peer_addr,
            self.config.clone(),
            Arc::clone(&self.broadcaster),
        );

        tokio::spawn(async move {
            // Held for the lifetime of the session
            let _permit = permit;

            if let Err(e) = connection.run(socket).await {
                tracing::debug!(
                    session_id = session_id,
                    error = %e,
                    "Connection error"
                );
            }

            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::MockTransport;

    async fn start() -> (Arc<RelayServer>, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ServerConfig::with_addr(addr).disable_startup_discovery();
        let server = RelayServer::with_transport(config, Arc::new(MockTransport::new()));
        assert_eq!(server.bind_addr(), addr);
        (Arc::new(server), listener)
    }

    #[tokio::test]
    async fn test_broadcaster_shutdown_ends_serve_cleanly() {
        let (server, listener) = start().await;

        let handle = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.serve(listener, std::future::pending()).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        server.broadcaster().shutdown();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok(), "serve returned {:?}", result);
    }

    #[tokio::test]
    async fn test_shutdown_future_ends_serve_cleanly() {
        let (server, listener) = start().await;

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            server.serve(listener, tokio::time::sleep(Duration::from_millis(20))),
        )
        .await
        .unwrap();

        assert!(result.is_ok());
        assert!(server.broadcaster().is_shutting_down());
    }
}
