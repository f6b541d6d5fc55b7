// src/core/storage/file.rs

//! The disk-backed cache backend: one `<key>.cache` file per entry.

use super::CacheStore;
use crate::core::errors::RampartError;
use async_trait::async_trait;
use bincode::{Decode, Encode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

/// How often the background sweeper scans the directory for expired files.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);
const CACHE_FILE_SUFFIX: &str = ".cache";

/// The on-disk representation of one entry: the stored blob plus its
/// absolute expiry as a unix timestamp.
#[derive(Debug, Encode, Decode)]
struct StoredBlob {
    body: Vec<u8>,
    expires_at_unix: u64,
}

impl StoredBlob {
    fn is_expired(&self, now_unix: u64) -> bool {
        now_unix > self.expires_at_unix
    }
}

/// A cache backend keeping each entry in its own file under a configured
/// directory. A store-wide reader/writer lock is held across mutations and
/// directory scans; per-file consistency comes from the filesystem.
pub struct FileStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    /// Opens (creating if needed) the cache directory.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, RampartError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            lock: RwLock::new(()),
        })
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}{CACHE_FILE_SUFFIX}"))
    }

    fn now_unix() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    /// Reads and decodes one cache file. An undecodable file (e.g. written by
    /// an older codec) is deleted and reported as absent.
    async fn read_blob(&self, path: &Path) -> Option<StoredBlob> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Error reading cache file {}: {}", path.display(), e);
                return None;
            }
        };
        match bincode::decode_from_slice::<StoredBlob, _>(&raw, bincode::config::standard()) {
            Ok((blob, _)) => Some(blob),
            Err(e) => {
                warn!(
                    "Undecodable cache file {}, deleting it: {}",
                    path.display(),
                    e
                );
                let _ = tokio::fs::remove_file(path).await;
                None
            }
        }
    }

    async fn remove_file(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Error removing cache file {}: {}", path.display(), e);
        }
    }

    /// Scans the directory and deletes every expired cache file.
    pub async fn sweep(&self) {
        let _guard = self.lock.write().await;
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Error reading cache directory {}: {}", self.dir.display(), e);
                return;
            }
        };

        let now = Self::now_unix();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("cache") {
                continue;
            }
            if let Some(blob) = self.read_blob(&path).await
                && blob.is_expired(now)
            {
                debug!("Sweeping expired cache file {}", path.display());
                self.remove_file(&path).await;
            }
        }
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let _guard = self.lock.write().await;
        let blob = StoredBlob {
            body: value,
            expires_at_unix: Self::now_unix().saturating_add(ttl.as_secs()),
        };
        let raw = match bincode::encode_to_vec(&blob, bincode::config::standard()) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Error serializing cache entry for key '{}': {}", key, e);
                return;
            }
        };
        if let Err(e) = tokio::fs::write(self.file_path(key), raw).await {
            warn!("Error writing cache file for key '{}': {}", key, e);
        }
    }

    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.file_path(key);
        {
            let _guard = self.lock.read().await;
            let blob = self.read_blob(&path).await?;
            if !blob.is_expired(Self::now_unix()) {
                return Some(blob.body);
            }
        }
        // Expired on read: re-acquire as a writer and drop the file.
        let _guard = self.lock.write().await;
        self.remove_file(&path).await;
        None
    }

    async fn pop(&self, key: &str) -> Option<Vec<u8>> {
        let _guard = self.lock.write().await;
        let path = self.file_path(key);
        let blob = self.read_blob(&path).await?;
        self.remove_file(&path).await;
        if blob.is_expired(Self::now_unix()) {
            return None;
        }
        Some(blob.body)
    }

    async fn remove(&self, key: &str) {
        let _guard = self.lock.write().await;
        self.remove_file(&self.file_path(key)).await;
    }

    async fn remove_by_prefix(&self, prefix: &str) {
        let _guard = self.lock.write().await;
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Error reading cache directory {}: {}", self.dir.display(), e);
                return;
            }
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(prefix) {
                self.remove_file(&entry.path()).await;
            }
        }
    }

    async fn get_ttl(&self, key: &str) -> Option<Duration> {
        let _guard = self.lock.read().await;
        let blob = self.read_blob(&self.file_path(key)).await?;
        let now = Self::now_unix();
        if blob.is_expired(now) {
            return None;
        }
        Some(Duration::from_secs(blob.expires_at_unix.saturating_sub(now)))
    }
}

/// A background task that periodically sweeps expired files from a
/// [`FileStore`].
pub struct FileSweeper {
    store: Arc<FileStore>,
}

impl FileSweeper {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }

    /// The main run loop for the sweeper task.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("File store expiry sweeper started.");
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.store.sweep().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("File store expiry sweeper shutting down.");
                    return;
                }
            }
        }
    }
}
