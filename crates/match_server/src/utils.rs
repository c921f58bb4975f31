//! Factory helpers for creating server instances.

use crate::{config::ServerConfig, server::MatchServer};

/// Creates a match server with default configuration.
///
/// # Example
///
/// ```rust
/// # #[tokio::main]
/// # async fn main() {
/// use match_server::create_server;
///
/// let server = create_server();
/// assert_eq!(server.connection_count(), 0);
/// # }
/// ```
pub fn create_server() -> MatchServer {
    MatchServer::new(ServerConfig::default())
}

/// Creates a match server with custom configuration.
///
/// # Arguments
///
/// * `config` - A `ServerConfig` instance with desired settings
///
/// # Example
///
/// ```rust
/// # #[tokio::main]
/// # async fn main() {
/// use match_server::{create_server_with_config, ServerConfig};
///
/// let config = ServerConfig {
///     bind_address: "0.0.0.0:9000".parse().unwrap(),
///     max_connections: 5000,
///     ..Default::default()
/// };
///
/// let server = create_server_with_config(config);
/// # }
/// ```
pub fn create_server_with_config(config: ServerConfig) -> MatchServer {
    MatchServer::new(config)
}
