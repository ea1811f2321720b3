//! Persistent tile store.
//!
//! One file per tile under a deterministic path:
//! `<root>/<cache_prefix>/<level>/<row>/<row>_<col>.<ext>`. Freshness is
//! judged by file modification time against the layer's per-level expiry
//! window; a stale file is deleted as soon as it is noticed.
//!
//! All reads and writes of tile files go through one per-store async
//! mutex. There is no temp-file-rename dance: the lock is what guarantees
//! a reader never observes a half-written file, and callers must tolerate
//! serialized writes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::coord::TileId;
use crate::layer::LayerDescriptor;

/// Errors from disk cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Aggregate statistics for one layer's cached files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskCacheStats {
    /// Number of cached tile files.
    pub entries: u64,
    /// Total file size in bytes.
    pub bytes: u64,
}

/// Persistent store mapping tile identity to a cached file.
pub struct DiskCacheStore {
    root: PathBuf,
    extension: &'static str,
    default_expiry: Option<Duration>,
    level_expiry: std::collections::HashMap<u8, Duration>,
    file_lock: Mutex<()>,
}

impl DiskCacheStore {
    /// Creates a store for one layer under the given cache root.
    pub fn new(cache_root: &Path, descriptor: &LayerDescriptor) -> Self {
        Self {
            root: cache_root.join(&descriptor.cache_prefix),
            extension: descriptor.stored_format.extension(),
            default_expiry: descriptor.default_expiry_secs.map(Duration::from_secs),
            level_expiry: descriptor
                .level_expiry_secs
                .iter()
                .map(|(&level, &secs)| (level, Duration::from_secs(secs)))
                .collect(),
            file_lock: Mutex::new(()),
        }
    }

    /// Directory holding this layer's files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic path for a tile's cached file.
    pub fn tile_path(&self, id: &TileId) -> PathBuf {
        let addr = &id.address;
        self.root
            .join(addr.level.to_string())
            .join(addr.row.to_string())
            .join(format!("{}_{}.{}", addr.row, addr.col, self.extension))
    }

    fn expiry_for(&self, level: u8) -> Option<Duration> {
        self.level_expiry
            .get(&level)
            .copied()
            .or(self.default_expiry)
    }

    /// Returns the cached file path if it exists and is fresh.
    ///
    /// A file older than the level's expiry window counts as a miss and is
    /// deleted proactively so the next fetch replaces it.
    pub async fn find_fresh(&self, id: &TileId) -> Option<PathBuf> {
        let path = self.tile_path(id);
        let metadata = tokio::fs::metadata(&path).await.ok()?;

        if let Some(window) = self.expiry_for(id.address.level) {
            let expired = metadata
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .map(|age| age > window)
                .unwrap_or(false);
            if expired {
                debug!(tile = %id, path = %path.display(), "cached tile expired, deleting");
                let _guard = self.file_lock.lock().await;
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "failed to delete expired tile");
                }
                return None;
            }
        }

        Some(path)
    }

    /// Non-blocking freshness probe without the deletion side effect.
    ///
    /// Safe to call from the render thread: a single metadata stat, no
    /// file content I/O and no lock.
    pub fn is_fresh(&self, id: &TileId) -> bool {
        let path = self.tile_path(id);
        let Ok(metadata) = std::fs::metadata(&path) else {
            return false;
        };
        match self.expiry_for(id.address.level) {
            None => true,
            Some(window) => metadata
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .map(|age| age <= window)
                .unwrap_or(true),
        }
    }

    /// Reads a cached tile's bytes, or `None` if no file exists.
    pub async fn read(&self, id: &TileId) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.tile_path(id);
        let _guard = self.file_lock.lock().await;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes a tile's bytes, creating parent directories as needed.
    pub async fn write(&self, id: &TileId, bytes: &[u8]) -> Result<PathBuf, CacheError> {
        let path = self.tile_path(id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let _guard = self.file_lock.lock().await;
        tokio::fs::write(&path, bytes).await?;
        debug!(tile = %id, path = %path.display(), bytes = bytes.len(), "tile written to disk cache");
        Ok(path)
    }

    /// Deletes a tile's cached file. Returns true if one existed.
    pub async fn remove(&self, id: &TileId) -> Result<bool, CacheError> {
        let path = self.tile_path(id);
        let _guard = self.file_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Walks the layer's directory and totals its cached files.
    pub async fn stats(&self) -> Result<DiskCacheStats, CacheError> {
        let mut stats = DiskCacheStats::default();
        let mut dirs = vec![self.root.clone()];

        while let Some(dir) = dirs.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    dirs.push(entry.path());
                } else {
                    stats.entries += 1;
                    stats.bytes += metadata.len();
                }
            }
        }

        Ok(stats)
    }
}
