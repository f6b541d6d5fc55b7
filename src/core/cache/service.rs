// src/core/cache/service.rs

//! The cache service: the store-backed operations addressed by derived keys.
//!
//! The device tag is a per-call argument rather than per-instance state, so
//! one service instance is safe under concurrent requests.

use super::key;
use crate::core::storage::CacheStore;
use std::sync::Arc;
use std::time::Duration;

/// Wraps the backend chosen at startup and applies key derivation to every
/// operation.
#[derive(Clone)]
pub struct CacheService {
    store: Arc<dyn CacheStore>,
}

impl CacheService {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Derives the storage key for `url` under an optional device tag.
    pub fn derive_key(&self, device_tag: Option<&str>, url: &str) -> String {
        key::derive_key(device_tag, url)
    }

    pub async fn set(&self, device_tag: Option<&str>, url: &str, value: Vec<u8>, ttl: Duration) {
        self.store
            .set(&self.derive_key(device_tag, url), value, ttl)
            .await;
    }

    pub async fn get(&self, device_tag: Option<&str>, url: &str) -> Option<Vec<u8>> {
        self.store.get(&self.derive_key(device_tag, url)).await
    }

    pub async fn pop(&self, device_tag: Option<&str>, url: &str) -> Option<Vec<u8>> {
        self.store.pop(&self.derive_key(device_tag, url)).await
    }

    pub async fn remove(&self, device_tag: Option<&str>, url: &str) {
        self.store.remove(&self.derive_key(device_tag, url)).await;
    }

    /// Removes every entry keyed under a URL that extends `url`.
    pub async fn remove_by_prefix(&self, device_tag: Option<&str>, url: &str) {
        self.store
            .remove_by_prefix(&self.derive_key(device_tag, url))
            .await;
    }

    pub async fn get_ttl(&self, device_tag: Option<&str>, url: &str) -> Option<Duration> {
        self.store.get_ttl(&self.derive_key(device_tag, url)).await
    }
}
