//! Rate limiting implementation using a token bucket per IP.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Buckets untouched for this long are dropped by cleanup.
const IDLE_BUCKET_TTL: Duration = Duration::from_secs(3600);

/// Token bucket rate limiter for controlling frame rates
#[derive(Debug)]
pub struct RateLimiter {
    buckets: RwLock<HashMap<IpAddr, TokenBucket>>,
    capacity: f64,
    refill_per_sec: f64,
    blocked_count: AtomicU64,
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Creates a limiter allowing bursts of `capacity` that refills fully
    /// once per `window`.
    pub fn new(capacity: u32, window: Duration) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            buckets: RwLock::new(HashMap::new()),
            capacity,
            refill_per_sec: capacity / window.as_secs_f64().max(f64::EPSILON),
            blocked_count: AtomicU64::new(0),
        }
    }

    pub fn per_minute(requests: u32) -> Self {
        Self::new(requests, Duration::from_secs(60))
    }

    /// Takes one token for `ip`, returning `false` when none is left.
    pub async fn check_rate_limit(&self, ip: IpAddr) -> bool {
        let mut buckets = self.buckets.write().await;
        let now = Instant::now();

        let bucket = buckets.entry(ip).or_insert(TokenBucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            self.blocked_count.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total number of rejected requests
    pub fn blocked_count(&self) -> u64 {
        self.blocked_count.load(Ordering::Relaxed)
    }

    /// Drops buckets idle for longer than an hour
    pub async fn cleanup_idle(&self) {
        let mut buckets = self.buckets.write().await;
        let now = Instant::now();
        buckets.retain(|_, bucket| now.duration_since(bucket.last_refill) < IDLE_BUCKET_TTL);
    }

    pub async fn tracked(&self) -> usize {
        self.buckets.read().await.len()
    }
}
