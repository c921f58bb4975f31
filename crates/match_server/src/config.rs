//! Server configuration types and defaults.
//!
//! This module contains the transport configuration together with the
//! inbound security limits and the match timing settings handed through to
//! the coordinator.

use match_core::MatchSettings;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// Configuration structure for the match server.
///
/// Contains all parameters needed to run the transport: where to listen,
/// how many sockets to accept, inbound frame limits and match timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Queued outbound frames on one connection above which a warning is logged
    pub outbound_queue_warn: usize,

    /// Security configuration settings
    pub security: SecurityConfig,

    /// Match lifecycle timings
    pub matches: MatchSettings,
}

/// Security configuration for inbound frame validation and connection limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable per-IP rate limiting of inbound frames
    pub enable_rate_limiting: bool,

    /// Maximum frames per minute per IP
    pub max_requests_per_minute: u32,

    /// Maximum frame size in bytes
    pub max_message_size: usize,

    /// Maximum allowed nesting depth for JSON frames
    pub max_json_depth: usize,

    /// Maximum allowed string length in JSON
    pub max_string_length: usize,

    /// Maximum allowed array/object size
    pub max_collection_size: usize,

    /// Maximum concurrent connections per IP (0 disables the check)
    pub max_connections_per_ip: u32,

    /// Addresses refused at accept time
    pub banned_ips: Vec<IpAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_connections: 1000,
            outbound_queue_warn: 256,
            security: SecurityConfig::default(),
            matches: MatchSettings::default(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_rate_limiting: true,
            max_requests_per_minute: 120,
            max_message_size: 16 * 1024,
            max_json_depth: 8,
            max_string_length: 512,
            max_collection_size: 64,
            max_connections_per_ip: 16,
            banned_ips: Vec::new(),
        }
    }
}
