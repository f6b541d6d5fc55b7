// src/core/ratelimit.rs

//! The per-client fixed-window rate limiter and its two bucket stores.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Key namespace for buckets held in the remote store.
const REMOTE_BUCKET_PREFIX: &str = "gowaf-ratelimit";

/// A bucket store records one hit per call and reports the running count
/// within the client's current window.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn hit(&self, client_ip: &str) -> u64;
}

struct Bucket {
    window_start: Instant,
    count: u64,
}

/// Process-local buckets in a concurrent map.
pub struct MemoryRateLimitStore {
    window: Duration,
    buckets: DashMap<String, Bucket>,
}

impl MemoryRateLimitStore {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buckets: DashMap::new(),
        }
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(&self, client_ip: &str) -> u64 {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(client_ip.to_string())
            .or_insert_with(|| Bucket {
                window_start: now,
                count: 0,
            });
        if now.duration_since(bucket.window_start) >= self.window {
            bucket.window_start = now;
            bucket.count = 0;
        }
        bucket.count += 1;
        bucket.count
    }
}

/// Buckets shared across proxy instances through the remote store.
/// A backend failure fails open: the request is admitted with a warning.
pub struct RedisRateLimitStore {
    conn: ConnectionManager,
    window: Duration,
}

impl RedisRateLimitStore {
    pub fn new(conn: ConnectionManager, window: Duration) -> Self {
        Self { conn, window }
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(&self, client_ip: &str) -> u64 {
        let mut conn = self.conn.clone();
        let key = format!("{REMOTE_BUCKET_PREFIX}:{client_ip}");
        let count: u64 = match conn.incr(&key, 1u64).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Rate limit backend error for '{}', admitting request: {}", client_ip, e);
                return 0;
            }
        };
        if count == 1 {
            let res: redis::RedisResult<()> =
                conn.pexpire(&key, self.window.as_millis() as i64).await;
            if let Err(e) = res {
                warn!("Failed to expire rate limit bucket '{}': {}", key, e);
            }
        }
        count
    }
}

/// The middleware-facing limiter: a bucket store plus the per-window cap.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    limit: u64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, limit: u64) -> Self {
        Self { store, limit }
    }

    /// Records a hit and reports whether the client is still within its cap.
    pub async fn allow(&self, client_ip: &str) -> bool {
        self.store.hit(client_ip).await <= self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn requests_within_the_cap_are_admitted() {
        let store = Arc::new(MemoryRateLimitStore::new(Duration::from_secs(60)));
        let limiter = RateLimiter::new(store, 3);
        for _ in 0..3 {
            assert!(limiter.allow("1.2.3.4").await);
        }
        assert!(!limiter.allow("1.2.3.4").await);
    }

    #[tokio::test]
    async fn clients_are_limited_independently() {
        let store = Arc::new(MemoryRateLimitStore::new(Duration::from_secs(60)));
        let limiter = RateLimiter::new(store, 1);
        assert!(limiter.allow("1.1.1.1").await);
        assert!(limiter.allow("2.2.2.2").await);
        assert!(!limiter.allow("1.1.1.1").await);
    }

    #[tokio::test]
    async fn the_window_resets_the_count() {
        let store = Arc::new(MemoryRateLimitStore::new(Duration::from_millis(30)));
        let limiter = RateLimiter::new(store, 1);
        assert!(limiter.allow("1.2.3.4").await);
        assert!(!limiter.allow("1.2.3.4").await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(limiter.allow("1.2.3.4").await);
    }
}
