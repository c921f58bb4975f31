//! Inbound protection: connection limits, frame validation and rate limiting.

use crate::config::SecurityConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod input_validation;
pub mod rate_limiter;

/// Central security manager for the match server
#[derive(Debug)]
pub struct SecurityManager {
    config: SecurityConfig,
    rate_limiter: rate_limiter::RateLimiter,
    connections_per_ip: Arc<RwLock<HashMap<IpAddr, u32>>>,
}

impl SecurityManager {
    /// Creates a new security manager with the given configuration
    pub fn new(config: SecurityConfig) -> Self {
        let rate_limiter = rate_limiter::RateLimiter::per_minute(config.max_requests_per_minute);

        Self {
            config,
            rate_limiter,
            connections_per_ip: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Admits a new connection from `ip`, counting it against the per-IP cap.
    ///
    /// Every successful call must be paired with [`on_disconnect`](Self::on_disconnect).
    pub async fn validate_connection(&self, ip: IpAddr) -> Result<(), SecurityError> {
        if self.config.banned_ips.contains(&ip) {
            return Err(SecurityError::BannedIp(ip));
        }

        let mut tracker = self.connections_per_ip.write().await;
        let count = tracker.entry(ip).or_insert(0);
        if self.config.max_connections_per_ip > 0 && *count >= self.config.max_connections_per_ip {
            return Err(SecurityError::TooManyConnections(ip));
        }
        *count += 1;
        Ok(())
    }

    /// Validates an incoming text frame
    pub async fn validate_message(&self, ip: IpAddr, message: &[u8]) -> Result<(), SecurityError> {
        if message.len() > self.config.max_message_size {
            return Err(SecurityError::MessageTooLarge(message.len()));
        }

        if self.config.enable_rate_limiting && !self.rate_limiter.check_rate_limit(ip).await {
            return Err(SecurityError::RateLimitExceeded(ip));
        }

        input_validation::validate_json_message(message, &self.config)
    }

    /// Releases the per-IP slot taken by [`validate_connection`](Self::validate_connection)
    pub async fn on_disconnect(&self, ip: IpAddr) {
        let mut tracker = self.connections_per_ip.write().await;
        if let Some(count) = tracker.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                tracker.remove(&ip);
            }
        }
    }

    /// Drops rate limiter buckets that have been idle for a while
    pub async fn cleanup(&self) {
        self.rate_limiter.cleanup_idle().await;
    }

    /// Gets current security statistics
    pub async fn get_stats(&self) -> SecurityStats {
        SecurityStats {
            tracked_ips: self.connections_per_ip.read().await.len(),
            rate_limited_requests: self.rate_limiter.blocked_count(),
            banned_ips: self.config.banned_ips.len(),
        }
    }
}

/// Security-related statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityStats {
    pub tracked_ips: usize,
    pub rate_limited_requests: u64,
    pub banned_ips: usize,
}

/// Security-related errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecurityError {
    #[error("IP address {0} is banned")]
    BannedIp(IpAddr),

    #[error("Too many connections from IP {0}")]
    TooManyConnections(IpAddr),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Rate limit exceeded for IP {0}")]
    RateLimitExceeded(IpAddr),

    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("Forbidden characters in message")]
    ForbiddenContent,
}
