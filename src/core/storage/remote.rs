// src/core/storage/remote.rs

//! The remote key-value cache backend, backed by a Redis-compatible server.

use super::CacheStore;
use crate::core::errors::RampartError;
use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::{info, warn};

/// Dial and I/O timeouts for the remote server.
const IO_TIMEOUT: Duration = Duration::from_secs(30);
/// Page size for cursored key scans.
const SCAN_BATCH: usize = 100;

/// A thin adapter over a remote key-value service. The multiplexed,
/// auto-reconnecting connection bounds concurrency; transient failures are
/// logged and surface as misses, never as panics.
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects to the remote server with dial/response timeouts applied.
    pub async fn connect(url: &str) -> Result<Self, RampartError> {
        let client = Client::open(url)?;
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(IO_TIMEOUT)
            .set_response_timeout(IO_TIMEOUT);
        let conn = client.get_connection_manager_with_config(config).await?;
        info!("Connected to the remote cache store.");
        Ok(Self { conn })
    }

    fn log_error(action: &str, key: &str, err: &redis::RedisError) {
        warn!("Error {} for key '{}': {}", action, key, err);
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let mut conn = self.conn.clone();
        let res: redis::RedisResult<()> = conn.set_ex(key, value, ttl.as_secs().max(1)).await;
        if let Err(e) = res {
            Self::log_error("setting value", key, &e);
        }
    }

    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<Vec<u8>>>(key).await {
            Ok(value) => value,
            Err(e) => {
                Self::log_error("getting value", key, &e);
                None
            }
        }
    }

    async fn pop(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = self.conn.clone();
        match conn.get_del::<_, Option<Vec<u8>>>(key).await {
            Ok(value) => value,
            Err(e) => {
                Self::log_error("popping value", key, &e);
                None
            }
        }
    }

    async fn remove(&self, key: &str) {
        let mut conn = self.conn.clone();
        let res: redis::RedisResult<()> = conn.del(key).await;
        if let Err(e) = res {
            Self::log_error("removing key", key, &e);
        }
    }

    async fn remove_by_prefix(&self, prefix: &str) {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys: Vec<String> = Vec::new();

        loop {
            let res: redis::RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await;
            match res {
                Ok((next_cursor, batch)) => {
                    keys.extend(batch);
                    cursor = next_cursor;
                    if cursor == 0 {
                        break;
                    }
                }
                Err(e) => {
                    Self::log_error("scanning keys", prefix, &e);
                    return;
                }
            }
        }

        if keys.is_empty() {
            return;
        }
        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.del(key).ignore();
        }
        if let Err(e) = pipe.query_async::<()>(&mut conn).await {
            Self::log_error("deleting keys by prefix", prefix, &e);
        }
    }

    async fn get_ttl(&self, key: &str) -> Option<Duration> {
        let mut conn = self.conn.clone();
        match conn.pttl::<_, i64>(key).await {
            // PTTL reports -2 for a missing key and -1 for no expiry.
            Ok(ms) if ms >= 0 => Some(Duration::from_millis(ms as u64)),
            Ok(_) => None,
            Err(e) => {
                Self::log_error("reading TTL", key, &e);
                None
            }
        }
    }
}
