//! In-memory texture cache with size-based eviction using moka.
//!
//! Backed by `moka::future::Cache`, which uses lock-free data structures
//! internally and is safe to touch from async workers without stalling
//! the runtime. Entries are weighted by payload size so the configured
//! capacity bounds bytes, not entry counts; eviction is moka's
//! LRU-flavored TinyLFU and needs no explicit locking.
//!
//! The render thread is not async, so [`MemoryTileCache::get_if_ready`]
//! exposes a non-blocking probe: a lookup that cannot complete
//! immediately reads as a miss and the caller retries on a later frame.

use std::sync::Arc;

use futures::FutureExt;
use moka::future::Cache;

use crate::coord::TileId;
use crate::texture::TileTexture;

/// Capacity-bounded cache of render-ready tile textures.
pub struct MemoryTileCache {
    cache: Cache<TileId, Arc<TileTexture>>,
    max_size_bytes: u64,
}

impl MemoryTileCache {
    /// Creates a cache bounded to the given total payload size.
    pub fn new(max_size_bytes: u64) -> Self {
        let cache = Cache::builder()
            .weigher(|_id: &TileId, texture: &Arc<TileTexture>| -> u32 {
                texture.byte_len().min(u32::MAX as usize) as u32
            })
            .max_capacity(max_size_bytes)
            .build();

        Self {
            cache,
            max_size_bytes,
        }
    }

    /// Retrieves a texture.
    pub async fn get(&self, id: &TileId) -> Option<Arc<TileTexture>> {
        self.cache.get(id).await
    }

    /// Non-blocking retrieval for the render thread.
    ///
    /// Returns `None` both on a genuine miss and when the lookup could
    /// not complete without waiting.
    pub fn get_if_ready(&self, id: &TileId) -> Option<Arc<TileTexture>> {
        self.cache.get(id).now_or_never().flatten()
    }

    /// Inserts a texture, evicting as needed to stay within capacity.
    pub async fn insert(&self, texture: TileTexture) {
        self.cache
            .insert(texture.id.clone(), Arc::new(texture))
            .await;
        self.cache.run_pending_tasks().await;
    }

    /// True if the tile is resident.
    pub fn contains(&self, id: &TileId) -> bool {
        self.cache.contains_key(id)
    }

    /// Number of resident entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Total weighted size of resident entries in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.cache.weighted_size()
    }

    /// Configured capacity in bytes.
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}
