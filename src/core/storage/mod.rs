// src/core/storage/mod.rs

//! The pluggable cache backends and the capability contract they share.

pub mod file;
pub mod memory;
pub mod remote;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use remote::RedisStore;

use async_trait::async_trait;
use std::time::Duration;

/// The capability set every cache backend implements.
///
/// All operations are safe under concurrent callers and degrade instead of
/// failing: a backend error on `get` is a miss, a backend error on `set` is a
/// silent drop (with a warning logged by the backend).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Stores `value` under `key`, overwriting any existing entry and
    /// resetting its expiry to `ttl` from now.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);

    /// Returns the value for `key`, or `None` if absent or expired.
    /// An entry found expired is removed lazily.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Atomically removes and returns the value for `key`. An expired entry
    /// is still removed but reported as a miss.
    async fn pop(&self, key: &str) -> Option<Vec<u8>>;

    /// Removes the entry for `key`, if any.
    async fn remove(&self, key: &str);

    /// Removes every entry whose key begins with `prefix` (byte-level match).
    /// Best-effort: a concurrent `set` racing with the removal may survive.
    async fn remove_by_prefix(&self, prefix: &str);

    /// Returns the remaining time until `key` expires, or `None` if the key
    /// is absent or already expired.
    async fn get_ttl(&self, key: &str) -> Option<Duration>;
}
