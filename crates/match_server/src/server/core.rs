//! Core match server implementation.
//!
//! `MatchServer` ties the transport pieces together: it owns the
//! coordinator, the connection manager that doubles as the coordinator's
//! outbox, and the security manager guarding the accept loop.

use crate::{
    config::ServerConfig,
    connection::ConnectionManager,
    error::ServerError,
    security::{SecurityManager, SecurityStats},
    server::handlers::handle_connection,
};
use match_core::{CoordinatorStats, MatchCoordinator, RulesEngineFactory, ShakmatyFactory};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Snapshot of server-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    pub connections: usize,
    pub coordinator: CoordinatorStats,
    pub security: SecurityStats,
}

/// The WebSocket front end of the match coordinator.
///
/// # Architecture
///
/// * **Coordinator**: Owns every match and decides every request
/// * **Connection Management**: Socket lifecycle and outbound queues
/// * **Security**: Per-IP admission, frame limits and rate limiting
///
/// The server holds no match logic itself. Frames are validated, decoded
/// and handed to the coordinator, whose replies come back through the
/// connection manager.
pub struct MatchServer {
    /// Server configuration settings
    config: ServerConfig,

    /// Match lifecycle authority
    coordinator: Arc<MatchCoordinator>,

    /// Manager for client connections and messaging
    connection_manager: Arc<ConnectionManager>,

    /// Inbound protection
    security: Arc<SecurityManager>,

    /// Set to `true` once shutdown is requested
    shutdown_sender: watch::Sender<bool>,
}

impl MatchServer {
    /// Creates a new match server backed by the standard chess rules.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration parameters for server behavior
    pub fn new(config: ServerConfig) -> Self {
        Self::with_engine(config, Arc::new(ShakmatyFactory))
    }

    /// Creates a new match server with a custom rules engine factory.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration parameters for server behavior
    /// * `engines` - Factory producing one rules engine per started match
    ///
    /// # Returns
    ///
    /// A server ready to [`start`](Self::start) or [`serve`](Self::serve).
    pub fn with_engine(config: ServerConfig, engines: Arc<dyn RulesEngineFactory>) -> Self {
        let connection_manager = Arc::new(ConnectionManager::new(config.outbound_queue_warn));
        let coordinator = Arc::new(MatchCoordinator::new(
            config.matches.clone(),
            engines,
            connection_manager.clone(),
        ));
        let security = Arc::new(SecurityManager::new(config.security.clone()));
        let (shutdown_sender, _) = watch::channel(false);

        Self {
            config,
            coordinator,
            connection_manager,
            security,
            shutdown_sender,
        }
    }

    /// Binds the configured address and serves until shutdown.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the server stopped cleanly, or `ServerError::Network` if
    /// the address could not be bound.
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| ServerError::Network(format!("Failed to bind {}: {e}", self.config.bind_address)))?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener until shutdown.
    ///
    /// # Accept Sequence
    ///
    /// 1. Start the coordinator's expiry loop
    /// 2. Accept sockets, refusing those over the global or per-IP limits
    /// 3. Spawn one handler task per admitted socket
    /// 4. On shutdown, close every socket and drop all matches
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(e.to_string()))?;
        info!("🚀 Match server listening on {}", local_addr);

        self.coordinator.init();
        let mut shutdown_receiver = self.shutdown_sender.subscribe();

        loop {
            if *shutdown_receiver.borrow_and_update() {
                info!("Internal shutdown signal received");
                break;
            }

            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    if self.connection_manager.connection_count() >= self.config.max_connections {
                        warn!("🚫 Refusing {}: connection limit {} reached", addr, self.config.max_connections);
                        continue;
                    }
                    if let Err(e) = self.security.validate_connection(addr.ip()).await {
                        warn!("🛡️ Refusing {}: {}", addr, e);
                        continue;
                    }

                    debug!("🔗 Accepted socket from {}", addr);
                    let coordinator = self.coordinator.clone();
                    let connection_manager = self.connection_manager.clone();
                    let security = self.security.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, addr, coordinator, connection_manager, security.clone()).await
                        {
                            error!("Connection error from {}: {}", addr, e);
                        }
                        security.on_disconnect(addr.ip()).await;
                    });
                }
                changed = shutdown_receiver.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("🧹 Performing server cleanup...");
        self.connection_manager.kick_all("server shutting down");
        self.coordinator.shutdown().await;
        info!("✅ Server stopped");
        Ok(())
    }

    /// Requests shutdown. Safe to call before or while [`serve`](Self::serve) runs.
    pub fn shutdown(&self) {
        info!("🛑 Shutting down server...");
        self.shutdown_sender.send_replace(true);
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn coordinator(&self) -> Arc<MatchCoordinator> {
        self.coordinator.clone()
    }

    pub fn connection_manager(&self) -> Arc<ConnectionManager> {
        self.connection_manager.clone()
    }

    pub fn security(&self) -> Arc<SecurityManager> {
        self.security.clone()
    }

    /// Number of currently open client connections
    pub fn connection_count(&self) -> usize {
        self.connection_manager.connection_count()
    }

    /// Collects counters from every component
    pub async fn stats(&self) -> ServerStats {
        ServerStats {
            connections: self.connection_manager.connection_count(),
            coordinator: self.coordinator.stats().await,
            security: self.security.get_stats().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_server_has_no_connections() {
        let server = MatchServer::new(ServerConfig::default());
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.stats().await, ServerStats::default());
    }

    #[tokio::test]
    async fn shutdown_requested_before_serve_returns_immediately() {
        let server = MatchServer::new(ServerConfig::default());
        server.shutdown();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), server.serve(listener)).await;
        assert!(matches!(outcome, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn start_reports_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig {
            bind_address: taken.local_addr().unwrap(),
            ..Default::default()
        };

        let server = MatchServer::new(config);
        assert!(matches!(server.start().await, Err(ServerError::Network(_))));
    }
}
