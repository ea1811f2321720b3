//! Retrieval worker pool.
//!
//! A fixed set of tokio tasks drains the request queue. Each worker
//! loops: dequeue → check the disk cache for a fresh copy → otherwise
//! download and post-process. Transient network failures leave the tile
//! unmarked — re-fetch is driven by later render-time cache misses, never
//! by the pool itself. A corrupt cached file is deleted and marked
//! absent, and the download proceeds anyway; success clears the mark.
//!
//! Workers publish a [`TileEvent`] per finished task on a broadcast
//! channel so callers can wait for specific tiles without polling.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{AbsentReason, AbsentResourceTracker, DiskCacheStore, MemoryTileCache};
use crate::coord::TileId;
use crate::fetch::{FetchTask, HttpClient, RequestQueue};
use crate::layer::LayerDescriptor;
use crate::process::{texture_from_stored, ProcessedTile, TilePostProcessor};
use crate::telemetry::PipelineMetrics;

/// How one tile fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    /// Texture is in the memory cache.
    Ready,
    /// Tile was marked absent.
    Absent,
    /// Transient failure; a later cache miss may retry.
    Failed,
}

/// Completion notice for one tile.
#[derive(Debug, Clone)]
pub struct TileEvent {
    /// The finished tile.
    pub id: TileId,
    /// How it finished.
    pub outcome: TileOutcome,
}

/// Everything a worker needs, bundled for cheap cloning into tasks.
#[derive(Clone)]
pub struct WorkerContext {
    /// Layer being serviced.
    pub descriptor: Arc<LayerDescriptor>,
    /// Queue the workers drain.
    pub queue: Arc<RequestQueue>,
    /// Memory cache receiving finished textures.
    pub memory: Arc<MemoryTileCache>,
    /// Disk store consulted before any download.
    pub disk: Arc<DiskCacheStore>,
    /// Absent-resource bookkeeping.
    pub absent: Arc<AbsentResourceTracker>,
    /// HTTP client for tile downloads.
    pub http: Arc<dyn HttpClient>,
    /// Format-aware response processing.
    pub processor: Arc<TilePostProcessor>,
    /// Pipeline counters.
    pub metrics: Arc<PipelineMetrics>,
    /// Completion event sink.
    pub events: broadcast::Sender<TileEvent>,
}

/// Bounded pool of retrieval workers.
pub struct RetrievalWorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl RetrievalWorkerPool {
    /// Spawns `count` workers onto the current runtime.
    pub fn spawn(count: usize, ctx: WorkerContext, shutdown: CancellationToken) -> Self {
        let handles = (0..count)
            .map(|worker| {
                let ctx = ctx.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(worker_loop(worker, ctx, shutdown))
            })
            .collect();

        Self { handles, shutdown }
    }

    /// Number of workers in the pool.
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Cancels the workers and waits for them to stop.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(worker: usize, ctx: WorkerContext, shutdown: CancellationToken) {
    debug!(worker, dataset = %ctx.descriptor.dataset, "retrieval worker started");

    loop {
        let task = tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,
            task = ctx.queue.next() => match task {
                Some(task) => task,
                None => break,
            },
        };

        let outcome = handle_task(&ctx, &task).await;
        ctx.queue.complete(&task.id);
        let _ = ctx.events.send(TileEvent {
            id: task.id.clone(),
            outcome,
        });
    }

    info!(worker, dataset = %ctx.descriptor.dataset, "retrieval worker stopped");
}

async fn handle_task(ctx: &WorkerContext, task: &FetchTask) -> TileOutcome {
    // Disk first: a fresh cached file makes the download unnecessary.
    if ctx.disk.find_fresh(&task.id).await.is_some() {
        match load_from_disk(ctx, &task.id).await {
            DiskLoad::Ready => return TileOutcome::Ready,
            DiskLoad::Missing => {}
            DiskLoad::Corrupt => {
                warn!(tile = %task.id, "deleted corrupt cached tile file");
                if let Err(e) = ctx.disk.remove(&task.id).await {
                    warn!(tile = %task.id, error = %e, "failed to delete corrupt tile file");
                }
                ctx.absent.mark(&task.id, AbsentReason::CorruptData);
                // A successful re-download below clears the mark.
            }
        }
    }

    download(ctx, task).await
}

async fn download(ctx: &WorkerContext, task: &FetchTask) -> TileOutcome {
    ctx.metrics.download_started();

    let response = match ctx.http.get(&task.url).await {
        Ok(response) => response,
        Err(e) => {
            ctx.metrics.download_failed();
            warn!(tile = %task.id, error = %e, "tile download failed, left eligible for retry");
            return TileOutcome::Failed;
        }
    };
    ctx.metrics.bytes_downloaded(response.body.len() as u64);

    match ctx.processor.process(&task.id, response).await {
        Ok(ProcessedTile::Ready(texture)) => {
            ctx.memory.insert(texture).await;
            ctx.absent.clear(&task.id);
            ctx.metrics.download_completed();
            TileOutcome::Ready
        }
        Ok(ProcessedTile::Absent(reason)) => {
            ctx.absent.mark(&task.id, reason);
            ctx.metrics.tile_marked_absent();
            TileOutcome::Absent
        }
        Err(e) => {
            ctx.metrics.download_failed();
            warn!(tile = %task.id, error = %e, "post-processing failed, left eligible for retry");
            TileOutcome::Failed
        }
    }
}

enum DiskLoad {
    Ready,
    Missing,
    Corrupt,
}

async fn load_from_disk(ctx: &WorkerContext, id: &TileId) -> DiskLoad {
    let bytes = match ctx.disk.read(id).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return DiskLoad::Missing,
        Err(e) => {
            warn!(tile = %id, error = %e, "disk cache read failed");
            return DiskLoad::Missing;
        }
    };

    let descriptor = Arc::clone(&ctx.descriptor);
    let tile = id.clone();
    let texture = tokio::task::spawn_blocking(move || {
        texture_from_stored(&descriptor, &tile, bytes)
    })
    .await
    .ok()
    .flatten();

    match texture {
        Some(texture) => {
            ctx.memory.insert(texture).await;
            ctx.absent.clear(id);
            ctx.metrics.disk_hit();
            DiskLoad::Ready
        }
        None => DiskLoad::Corrupt,
    }
}
