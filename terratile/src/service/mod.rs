//! The tile service: the pipeline's upward interface.
//!
//! One [`TileService`] serves one layer descriptor. The rendering
//! consumer calls [`request_tile`](TileService::request_tile) every frame
//! it needs a tile: the call never blocks, returning the texture when the
//! memory cache has it and `None` otherwise — a miss enqueues an
//! asynchronous fetch as a side effect and the renderer re-polls on a
//! later frame, substituting a lower-resolution tile meanwhile.
//!
//! ```text
//! render thread ──► request_tile ──► MemoryTileCache ──► hit ──► texture
//!                        │ miss
//!                        ▼
//!                  AbsentResourceTracker ──► marked ──► None (suppressed)
//!                        │ unmarked
//!                        ▼
//!                  RequestQueue ──► RetrievalWorkerPool ──► disk / network
//!                                              │
//!                        caches populated ◄────┘
//! ```

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::{AbsentResourceTracker, DiskCacheStore, MemoryTileCache};
use crate::config::{ConfigError, PipelineConfig};
use crate::coord::{TileAddress, TileId};
use crate::fetch::{
    FetchError, FetchTask, HttpClient, ReqwestClient, RequestQueue, RetrievalWorkerPool,
    TileEvent, TileOutcome, WorkerContext,
};
use crate::layer::{LayerDescriptor, LayerError};
use crate::process::TilePostProcessor;
use crate::telemetry::{PipelineMetrics, TelemetrySnapshot};
use crate::texture::TileTexture;

/// Capacity of the completion-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Errors from service startup.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The layer descriptor is unusable.
    #[error("invalid layer descriptor: {0}")]
    Descriptor(#[from] LayerError),

    /// The pipeline configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be constructed.
    #[error(transparent)]
    Http(#[from] FetchError),
}

/// Asynchronous tile retrieval and caching for one layer.
pub struct TileService {
    descriptor: Arc<LayerDescriptor>,
    dataset: Arc<str>,
    queue: Arc<RequestQueue>,
    memory: Arc<MemoryTileCache>,
    disk: Arc<DiskCacheStore>,
    absent: Arc<AbsentResourceTracker>,
    metrics: Arc<PipelineMetrics>,
    events: broadcast::Sender<TileEvent>,
    pool: RetrievalWorkerPool,
}

impl TileService {
    /// Starts the service with a real HTTP client.
    ///
    /// Must be called within a tokio runtime: the worker pool is spawned
    /// onto the current runtime.
    pub fn start(
        config: PipelineConfig,
        descriptor: LayerDescriptor,
    ) -> Result<Self, ServiceError> {
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new(
            config.connect_timeout,
            config.read_timeout,
        )?);
        Self::start_with_client(config, descriptor, http)
    }

    /// Starts the service with an injected HTTP client (used by tests).
    pub fn start_with_client(
        config: PipelineConfig,
        descriptor: LayerDescriptor,
        http: Arc<dyn HttpClient>,
    ) -> Result<Self, ServiceError> {
        descriptor.validate()?;
        config.validate()?;

        let descriptor = Arc::new(descriptor);
        let queue = Arc::new(RequestQueue::new());
        let memory = Arc::new(MemoryTileCache::new(config.memory_cache_bytes));
        let disk = Arc::new(DiskCacheStore::new(&config.cache_root, &descriptor));
        let absent = Arc::new(AbsentResourceTracker::new());
        let metrics = Arc::new(PipelineMetrics::new());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let processor = Arc::new(TilePostProcessor::new(
            Arc::clone(&descriptor),
            Arc::clone(&disk),
            Arc::clone(&http),
        ));

        let ctx = WorkerContext {
            descriptor: Arc::clone(&descriptor),
            queue: Arc::clone(&queue),
            memory: Arc::clone(&memory),
            disk: Arc::clone(&disk),
            absent: Arc::clone(&absent),
            http,
            processor,
            metrics: Arc::clone(&metrics),
            events: events.clone(),
        };
        let pool = RetrievalWorkerPool::spawn(config.workers, ctx, CancellationToken::new());

        info!(
            dataset = %descriptor.dataset,
            workers = config.workers,
            cache_root = %config.cache_root.display(),
            "tile service started"
        );

        let dataset: Arc<str> = descriptor.dataset.as_str().into();
        Ok(Self {
            descriptor,
            dataset,
            queue,
            memory,
            disk,
            absent,
            metrics,
            events,
            pool,
        })
    }

    /// The layer this service serves.
    pub fn descriptor(&self) -> &LayerDescriptor {
        &self.descriptor
    }

    /// This service's disk store (CLI maintenance and stats).
    pub fn disk(&self) -> &DiskCacheStore {
        &self.disk
    }

    /// Identity of a tile of this layer.
    pub fn tile_id(&self, address: TileAddress) -> TileId {
        TileId::new(Arc::clone(&self.dataset), address)
    }

    /// Non-blocking render-time tile lookup.
    ///
    /// Returns the texture on a memory hit. On a miss, returns `None`
    /// immediately and — unless the tile is marked absent or already in
    /// flight — enqueues a fetch at the given priority (lower = more
    /// urgent; callers use distance-to-viewer).
    pub fn request_tile(
        &self,
        address: TileAddress,
        priority: f64,
    ) -> Option<Arc<TileTexture>> {
        let id = self.tile_id(address);
        self.metrics.tile_requested();

        if let Some(texture) = self.memory.get_if_ready(&id) {
            self.metrics.memory_hit();
            return Some(texture);
        }
        self.metrics.memory_miss();

        if self.absent.is_absent(&id) {
            self.metrics.request_suppressed();
            return None;
        }

        let url = self.descriptor.url_for(&address);
        self.queue.enqueue(FetchTask::new(id, priority, url));
        None
    }

    /// True if the tile could be produced without a network fetch.
    pub fn is_tile_available(&self, address: TileAddress) -> bool {
        let id = self.tile_id(address);
        if self.absent.is_absent(&id) {
            return false;
        }
        self.memory.contains(&id) || self.disk.is_fresh(&id)
    }

    /// Fetches a tile and waits for it to become render-ready.
    ///
    /// Used by prefetchers and tests; the rendering consumer should use
    /// [`request_tile`](Self::request_tile) instead. Returns `None` when
    /// the tile is (or becomes) absent or the fetch fails transiently.
    pub async fn await_tile(
        &self,
        address: TileAddress,
        priority: f64,
    ) -> Option<Arc<TileTexture>> {
        let id = self.tile_id(address);

        if let Some(texture) = self.memory.get(&id).await {
            return Some(texture);
        }
        if self.absent.is_absent(&id) {
            return None;
        }

        // Subscribe before enqueueing so the completion event cannot slip
        // between the two.
        let mut events = self.events.subscribe();
        let url = self.descriptor.url_for(&address);
        self.queue.enqueue(FetchTask::new(id.clone(), priority, url));

        loop {
            match events.recv().await {
                Ok(event) if event.id == id => {
                    return match event.outcome {
                        TileOutcome::Ready => self.memory.get(&id).await,
                        TileOutcome::Absent | TileOutcome::Failed => None,
                    };
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    // Missed events; resolve from current state
                    if let Some(texture) = self.memory.get(&id).await {
                        return Some(texture);
                    }
                    if self.absent.is_absent(&id) || !self.queue.is_pending(&id) {
                        return None;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// True if the tile is currently marked absent.
    pub fn is_tile_absent(&self, address: TileAddress) -> bool {
        self.absent.is_absent(&self.tile_id(address))
    }

    /// Clears the absent mark for one tile so the next lookup may fetch
    /// it again. Returns true if a mark was present.
    pub fn refresh_tile(&self, address: TileAddress) -> bool {
        self.absent.clear(&self.tile_id(address))
    }

    /// Clears every absent mark for this layer (user-triggered refresh).
    /// Returns the number of marks cleared.
    pub fn refresh_all(&self) -> usize {
        self.absent.clear_dataset(&self.descriptor.dataset)
    }

    /// Point-in-time pipeline counters.
    pub fn metrics(&self) -> TelemetrySnapshot {
        self.metrics.snapshot()
    }

    /// Entries waiting in the request queue.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Stops the workers and waits for them to finish.
    pub async fn shutdown(self) {
        info!(dataset = %self.descriptor.dataset, "tile service shutting down");
        self.queue.close();
        self.pool.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchResponse, MockHttpClient};
    use crate::layer::{Projection, StoredFormat};
    use bytes::Bytes;
    use image::{Rgba, RgbaImage};
    use std::collections::HashMap;

    fn descriptor() -> LayerDescriptor {
        LayerDescriptor {
            dataset: "test".into(),
            display_name: "Test".into(),
            url_template: "http://example.com/{level}/{row}/{col}.png".into(),
            mask_url_template: None,
            cache_prefix: "example/test".into(),
            stored_format: StoredFormat::Png,
            projection: Projection::Equirectangular,
            level_count: 12,
            reject_blank_tiles: false,
            default_expiry_secs: None,
            level_expiry_secs: HashMap::new(),
        }
    }

    fn png_response() -> Result<FetchResponse, FetchError> {
        let image = RgbaImage::from_fn(8, 8, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        image.write_to(&mut out, image::ImageFormat::Png).unwrap();
        Ok(FetchResponse {
            status: 200,
            content_type: Some("image/png".into()),
            body: Bytes::from(out.into_inner()),
        })
    }

    fn service(
        dir: &std::path::Path,
        response: Result<FetchResponse, FetchError>,
    ) -> TileService {
        let config = PipelineConfig::default()
            .with_workers(2)
            .with_cache_root(dir);
        TileService::start_with_client(
            config,
            descriptor(),
            Arc::new(MockHttpClient { response }),
        )
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_request_tile_miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), png_response());
        let address = TileAddress::new(5, 4, 3);

        // First request misses and schedules the fetch
        assert!(service.request_tile(address, 1.0).is_none());

        // Wait for the pipeline, then the same request hits memory
        assert!(service.await_tile(address, 1.0).await.is_some());
        assert!(service.request_tile(address, 1.0).is_some());

        let snapshot = service.metrics();
        assert!(snapshot.memory_hits >= 1);
        assert!(snapshot.downloads_completed >= 1);

        service.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_absent_tile_suppresses_requests() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(
            dir.path(),
            Ok(FetchResponse {
                status: 204,
                content_type: None,
                body: Bytes::new(),
            }),
        );
        let address = TileAddress::new(5, 4, 3);

        assert!(service.await_tile(address, 1.0).await.is_none());
        assert!(!service.is_tile_available(address));

        // Subsequent requests neither return data nor enqueue work
        assert!(service.request_tile(address, 1.0).is_none());
        assert_eq!(service.queue_len(), 0);
        assert!(service.metrics().requests_suppressed >= 1);

        service.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_refresh_reenables_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(
            dir.path(),
            Ok(FetchResponse {
                status: 204,
                content_type: None,
                body: Bytes::new(),
            }),
        );
        let address = TileAddress::new(5, 4, 3);

        assert!(service.await_tile(address, 1.0).await.is_none());
        assert!(service.refresh_tile(address));
        assert!(!service.refresh_tile(address));

        // Re-fetch allowed again (still 204, so absent again afterwards)
        assert!(service.await_tile(address, 1.0).await.is_none());

        service.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_is_tile_available_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), png_response());
        let address = TileAddress::new(5, 4, 3);

        assert!(!service.is_tile_available(address));
        service.await_tile(address, 1.0).await.unwrap();
        assert!(service.is_tile_available(address));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = descriptor();
        bad.url_template = "http://example.com/static.png".into();

        let result = TileService::start_with_client(
            PipelineConfig::default().with_cache_root(dir.path()),
            bad,
            Arc::new(MockHttpClient {
                response: png_response(),
            }),
        );
        assert!(matches!(result, Err(ServiceError::Descriptor(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let result = TileService::start_with_client(
            PipelineConfig::default()
                .with_workers(0)
                .with_cache_root(dir.path()),
            descriptor(),
            Arc::new(MockHttpClient {
                response: png_response(),
            }),
        );
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }
}
