//! Lock-free pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the pipeline as it runs.
///
/// All updates use relaxed atomics: the counters feed dashboards and
/// logs, not control flow.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    tiles_requested: AtomicU64,
    memory_hits: AtomicU64,
    memory_misses: AtomicU64,
    disk_hits: AtomicU64,
    downloads_started: AtomicU64,
    downloads_completed: AtomicU64,
    downloads_failed: AtomicU64,
    bytes_downloaded: AtomicU64,
    tiles_marked_absent: AtomicU64,
    requests_suppressed: AtomicU64,
}

impl PipelineMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// A render-time tile request arrived.
    pub fn tile_requested(&self) {
        self.tiles_requested.fetch_add(1, Ordering::Relaxed);
    }

    /// The memory cache answered a request.
    pub fn memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// The memory cache missed.
    pub fn memory_miss(&self) {
        self.memory_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A worker served a tile from the disk cache.
    pub fn disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// A download began.
    pub fn download_started(&self) {
        self.downloads_started.fetch_add(1, Ordering::Relaxed);
    }

    /// A download produced a render-ready tile.
    pub fn download_completed(&self) {
        self.downloads_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// A download or post-process failed transiently.
    pub fn download_failed(&self) {
        self.downloads_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Payload bytes received from the network.
    pub fn bytes_downloaded(&self, bytes: u64) {
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// A tile was marked absent.
    pub fn tile_marked_absent(&self) {
        self.tiles_marked_absent.fetch_add(1, Ordering::Relaxed);
    }

    /// A request was dropped because the tile is marked absent.
    pub fn request_suppressed(&self) {
        self.requests_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of all counters.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            tiles_requested: self.tiles_requested.load(Ordering::Relaxed),
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            memory_misses: self.memory_misses.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            downloads_started: self.downloads_started.load(Ordering::Relaxed),
            downloads_completed: self.downloads_completed.load(Ordering::Relaxed),
            downloads_failed: self.downloads_failed.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            tiles_marked_absent: self.tiles_marked_absent.load(Ordering::Relaxed),
            requests_suppressed: self.requests_suppressed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    /// Render-time tile requests.
    pub tiles_requested: u64,
    /// Requests answered from the memory cache.
    pub memory_hits: u64,
    /// Requests that missed the memory cache.
    pub memory_misses: u64,
    /// Worker-side disk cache hits.
    pub disk_hits: u64,
    /// Downloads begun.
    pub downloads_started: u64,
    /// Downloads that produced a render-ready tile.
    pub downloads_completed: u64,
    /// Transient download/processing failures.
    pub downloads_failed: u64,
    /// Payload bytes received.
    pub bytes_downloaded: u64,
    /// Tiles marked absent.
    pub tiles_marked_absent: u64,
    /// Requests suppressed by absent marks.
    pub requests_suppressed: u64,
}

impl TelemetrySnapshot {
    /// Memory hit ratio over all render-time requests, 0.0 when idle.
    pub fn memory_hit_ratio(&self) -> f64 {
        let total = self.memory_hits + self.memory_misses;
        if total == 0 {
            0.0
        } else {
            self.memory_hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let snapshot = PipelineMetrics::new().snapshot();
        assert_eq!(snapshot, TelemetrySnapshot::default());
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = PipelineMetrics::new();
        metrics.tile_requested();
        metrics.tile_requested();
        metrics.memory_hit();
        metrics.memory_miss();
        metrics.disk_hit();
        metrics.download_started();
        metrics.download_completed();
        metrics.bytes_downloaded(1500);
        metrics.bytes_downloaded(500);
        metrics.tile_marked_absent();
        metrics.request_suppressed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tiles_requested, 2);
        assert_eq!(snapshot.memory_hits, 1);
        assert_eq!(snapshot.memory_misses, 1);
        assert_eq!(snapshot.disk_hits, 1);
        assert_eq!(snapshot.downloads_started, 1);
        assert_eq!(snapshot.downloads_completed, 1);
        assert_eq!(snapshot.bytes_downloaded, 2000);
        assert_eq!(snapshot.tiles_marked_absent, 1);
        assert_eq!(snapshot.requests_suppressed, 1);
    }

    #[test]
    fn test_memory_hit_ratio() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.snapshot().memory_hit_ratio(), 0.0);

        metrics.memory_hit();
        metrics.memory_hit();
        metrics.memory_hit();
        metrics.memory_miss();
        assert!((metrics.snapshot().memory_hit_ratio() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;

        let metrics = Arc::new(PipelineMetrics::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let metrics = Arc::clone(&metrics);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    metrics.tile_requested();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().tiles_requested, 8000);
    }
}
