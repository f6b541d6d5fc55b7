// src/core/storage/memory.rs

//! The process-local in-memory cache backend.

use super::CacheStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::System;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// How often the background sweeper removes expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);
/// Fraction of total system memory the store may occupy before evicting.
const MEMORY_BUDGET_RATIO: f64 = 0.8;

struct StoredEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

struct Inner {
    items: HashMap<String, StoredEntry>,
    used_bytes: usize,
}

/// A process-wide map guarded by a reader/writer lock, with a soft memory
/// budget enforced on insert and a periodic expiry sweep.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    budget_bytes: usize,
}

impl MemoryStore {
    /// Creates the store, sampling total system memory once to fix the
    /// eviction budget.
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        let budget_bytes = (sys.total_memory() as f64 * MEMORY_BUDGET_RATIO) as usize;
        info!(
            "Memory cache store initialized with a soft budget of {} bytes.",
            budget_bytes
        );
        Self::with_budget(budget_bytes)
    }

    /// Creates the store with an explicit byte budget.
    pub fn with_budget(budget_bytes: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                items: HashMap::new(),
                used_bytes: 0,
            }),
            budget_bytes,
        }
    }

    fn entry_footprint(key: &str, value: &[u8]) -> usize {
        key.len() + value.len()
    }

    /// Evicts the entries closest to expiry until the store fits its budget.
    fn evict_to_budget(inner: &mut Inner, budget_bytes: usize) {
        while inner.used_bytes > budget_bytes {
            let victim = inner
                .items
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(key, _)| key.clone());
            let Some(key) = victim else { break };
            if let Some(entry) = inner.items.remove(&key) {
                inner.used_bytes = inner
                    .used_bytes
                    .saturating_sub(Self::entry_footprint(&key, &entry.value));
                warn!("Evicted cache entry '{}' to stay under the memory budget.", key);
            }
        }
    }

    fn remove_if_expired(&self, key: &str) {
        let mut inner = self.inner.write();
        if inner.items.get(key).is_some_and(StoredEntry::is_expired)
            && let Some(entry) = inner.items.remove(key)
        {
            inner.used_bytes = inner
                .used_bytes
                .saturating_sub(Self::entry_footprint(key, &entry.value));
        }
    }

    /// Removes every expired entry. Candidates are gathered under a read
    /// lock so the write lock is only held for the actual removals.
    pub fn sweep(&self) {
        let expired: Vec<String> = {
            let inner = self.inner.read();
            inner
                .items
                .iter()
                .filter(|(_, entry)| entry.is_expired())
                .map(|(key, _)| key.clone())
                .collect()
        };
        if expired.is_empty() {
            return;
        }
        debug!("Sweeping {} expired entries from the memory store.", expired.len());
        for key in expired {
            self.remove_if_expired(&key);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let footprint = Self::entry_footprint(key, &value);
        let expires_at = Instant::now() + ttl;
        let mut inner = self.inner.write();
        if let Some(old) = inner
            .items
            .insert(key.to_string(), StoredEntry { value, expires_at })
        {
            inner.used_bytes = inner
                .used_bytes
                .saturating_sub(Self::entry_footprint(key, &old.value));
        }
        inner.used_bytes += footprint;
        if inner.used_bytes > self.budget_bytes {
            Self::evict_to_budget(&mut inner, self.budget_bytes);
        }
    }

    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        {
            let inner = self.inner.read();
            match inner.items.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired on read: drop it lazily and report a miss.
        self.remove_if_expired(key);
        None
    }

    async fn pop(&self, key: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.write();
        let entry = inner.items.remove(key)?;
        inner.used_bytes = inner
            .used_bytes
            .saturating_sub(Self::entry_footprint(key, &entry.value));
        if entry.is_expired() {
            return None;
        }
        Some(entry.value)
    }

    async fn remove(&self, key: &str) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.items.remove(key) {
            inner.used_bytes = inner
                .used_bytes
                .saturating_sub(Self::entry_footprint(key, &entry.value));
        }
    }

    async fn remove_by_prefix(&self, prefix: &str) {
        let matching: Vec<String> = {
            let inner = self.inner.read();
            inner
                .items
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect()
        };
        let mut inner = self.inner.write();
        for key in matching {
            if let Some(entry) = inner.items.remove(&key) {
                inner.used_bytes = inner
                    .used_bytes
                    .saturating_sub(Self::entry_footprint(&key, &entry.value));
            }
        }
    }

    async fn get_ttl(&self, key: &str) -> Option<Duration> {
        {
            let inner = self.inner.read();
            match inner.items.get(key) {
                Some(entry) if !entry.is_expired() => {
                    return Some(entry.expires_at.saturating_duration_since(Instant::now()));
                }
                Some(_) => {}
                None => return None,
            }
        }
        self.remove_if_expired(key);
        None
    }
}

/// A background task that periodically removes expired entries from a
/// [`MemoryStore`].
pub struct MemorySweeper {
    store: Arc<MemoryStore>,
}

impl MemorySweeper {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// The main run loop for the sweeper task.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Memory store expiry sweeper started.");
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.store.sweep();
                }
                _ = shutdown_rx.recv() => {
                    info!("Memory store expiry sweeper shutting down.");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_TTL: Duration = Duration::from_secs(60);
    const SHORT_TTL: Duration = Duration::from_millis(30);

    fn test_store() -> MemoryStore {
        MemoryStore::with_budget(1024 * 1024)
    }

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let store = test_store();
        store.set("k1", b"v1".to_vec(), LONG_TTL).await;
        assert_eq!(store.get("k1").await, Some(b"v1".to_vec()));
    }

    #[tokio::test]
    async fn set_overwrites_and_resets_expiry() {
        let store = test_store();
        store.set("k1", b"old".to_vec(), SHORT_TTL).await;
        store.set("k1", b"new".to_vec(), LONG_TTL).await;
        tokio::time::sleep(SHORT_TTL * 2).await;
        assert_eq!(store.get("k1").await, Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_and_is_removed() {
        let store = test_store();
        store.set("k1", b"v1".to_vec(), SHORT_TTL).await;
        tokio::time::sleep(SHORT_TTL * 2).await;
        assert_eq!(store.get("k1").await, None);
        assert!(store.inner.read().items.is_empty());
    }

    #[tokio::test]
    async fn pop_removes_and_returns() {
        let store = test_store();
        store.set("k1", b"v1".to_vec(), LONG_TTL).await;
        assert_eq!(store.pop("k1").await, Some(b"v1".to_vec()));
        assert_eq!(store.get("k1").await, None);
    }

    #[tokio::test]
    async fn pop_of_expired_entry_removes_but_misses() {
        let store = test_store();
        store.set("k1", b"v1".to_vec(), SHORT_TTL).await;
        tokio::time::sleep(SHORT_TTL * 2).await;
        assert_eq!(store.pop("k1").await, None);
        assert!(store.inner.read().items.is_empty());
    }

    #[tokio::test]
    async fn ttl_is_positive_and_bounded() {
        let store = test_store();
        store.set("k1", b"v1".to_vec(), LONG_TTL).await;
        let remaining = store.get_ttl("k1").await.expect("entry should be live");
        assert!(remaining > Duration::ZERO);
        assert!(remaining <= LONG_TTL);
    }

    #[tokio::test]
    async fn ttl_is_non_increasing() {
        let store = test_store();
        store.set("k1", b"v1".to_vec(), LONG_TTL).await;
        let first = store.get_ttl("k1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = store.get_ttl("k1").await.unwrap();
        assert!(second <= first);
    }

    #[tokio::test]
    async fn remove_by_prefix_only_touches_matching_keys() {
        let store = test_store();
        store.set("blog-a", b"1".to_vec(), LONG_TTL).await;
        store.set("blog-b", b"2".to_vec(), LONG_TTL).await;
        store.set("page-a", b"3".to_vec(), LONG_TTL).await;
        store.remove_by_prefix("blog-").await;
        assert_eq!(store.get("blog-a").await, None);
        assert_eq!(store.get("blog-b").await, None);
        assert_eq!(store.get("page-a").await, Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn over_budget_set_evicts_earliest_expiry_first() {
        let store = MemoryStore::with_budget(40);
        store.set("soon", vec![0u8; 16], Duration::from_secs(5)).await;
        store.set("later", vec![0u8; 16], Duration::from_secs(500)).await;
        // Pushes the footprint over 40 bytes; "soon" expires first and goes.
        store.set("third", vec![0u8; 16], Duration::from_secs(50)).await;
        assert_eq!(store.get("soon").await, None);
        assert!(store.get("later").await.is_some());
        assert!(store.inner.read().used_bytes <= 40);
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let store = test_store();
        store.set("stale", b"1".to_vec(), SHORT_TTL).await;
        store.set("fresh", b"2".to_vec(), LONG_TTL).await;
        tokio::time::sleep(SHORT_TTL * 2).await;
        store.sweep();
        let inner = store.inner.read();
        assert!(!inner.items.contains_key("stale"));
        assert!(inner.items.contains_key("fresh"));
    }

    #[tokio::test]
    async fn used_bytes_tracks_insert_and_remove() {
        let store = test_store();
        store.set("k1", vec![0u8; 10], LONG_TTL).await;
        assert_eq!(store.inner.read().used_bytes, 12);
        store.remove("k1").await;
        assert_eq!(store.inner.read().used_bytes, 0);
    }
}
