//! Priority queue for pending tile fetches.
//!
//! Tasks are ordered by priority value (lower = more urgent; callers use
//! distance-to-viewer), with FIFO order among equal priorities. The queue
//! deduplicates by tile identity across both queued and in-flight tasks:
//! enqueueing a tile that is already anywhere in the pipeline is a no-op,
//! and the first writer's priority wins. A slot is released only when a
//! worker calls [`RequestQueue::complete`], after which a later cache miss
//! may enqueue the tile again.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::coord::TileId;

/// Global sequence counter for FIFO ordering within priority levels.
static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_sequence() -> u64 {
    SEQUENCE_COUNTER.fetch_add(1, AtomicOrdering::Relaxed)
}

/// A pending tile fetch.
///
/// Plain data: scheduling policy lives in [`compare_queued`], not in the
/// task itself.
#[derive(Debug, Clone)]
pub struct FetchTask {
    /// Identity of the tile to fetch.
    pub id: TileId,
    /// Urgency; lower values are serviced first.
    pub priority: f64,
    /// Source URL for the tile imagery.
    pub url: String,
}

impl FetchTask {
    /// Create a new fetch task.
    pub fn new(id: TileId, priority: f64, url: impl Into<String>) -> Self {
        Self {
            id,
            priority,
            url: url.into(),
        }
    }
}

/// A task plus its queue admission order.
#[derive(Debug)]
pub struct QueuedFetch {
    /// The task to execute.
    pub task: FetchTask,
    /// Admission order for FIFO within a priority level.
    sequence: u64,
}

/// Scheduling order: lowest priority value first, FIFO among equals.
pub fn compare_queued(a: &QueuedFetch, b: &QueuedFetch) -> Ordering {
    a.task
        .priority
        .total_cmp(&b.task.priority)
        .then(a.sequence.cmp(&b.sequence))
}

// BinaryHeap is a max-heap; reverse the comparator so the most urgent
// task surfaces first.
impl Ord for QueuedFetch {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_queued(self, other).reverse()
    }
}

impl PartialOrd for QueuedFetch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedFetch {
    fn eq(&self, other: &Self) -> bool {
        compare_queued(self, other) == Ordering::Equal
    }
}

impl Eq for QueuedFetch {}

struct Inner {
    heap: BinaryHeap<QueuedFetch>,
    /// Identities that are queued or in-flight.
    pending: HashSet<TileId>,
}

/// Thread-safe priority queue with identity deduplication.
///
/// Producers (the render thread) call [`enqueue`](Self::enqueue); workers
/// call [`next`](Self::next) and, once a task is fully handled,
/// [`complete`](Self::complete).
pub struct RequestQueue {
    inner: Mutex<Inner>,
    available: Semaphore,
}

impl RequestQueue {
    /// Creates a new empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                pending: HashSet::new(),
            }),
            available: Semaphore::new(0),
        }
    }

    /// Adds a task unless its tile is already queued or in-flight.
    ///
    /// Returns `false` for the deduplicated no-op case. The existing
    /// task's priority is not updated.
    pub fn enqueue(&self, task: FetchTask) -> bool {
        {
            let mut inner = self.inner.lock();
            if !inner.pending.insert(task.id.clone()) {
                return false;
            }
            inner.heap.push(QueuedFetch {
                task,
                sequence: next_sequence(),
            });
        }
        self.available.add_permits(1);
        true
    }

    /// Waits for and removes the most urgent task.
    ///
    /// The tile stays reserved (in-flight) until [`complete`](Self::complete)
    /// is called for it. Returns `None` once the queue has been closed.
    pub async fn next(&self) -> Option<FetchTask> {
        let permit = self.available.acquire().await.ok()?;
        permit.forget();
        let mut inner = self.inner.lock();
        inner.heap.pop().map(|queued| queued.task)
    }

    /// Releases the in-flight reservation for a tile.
    pub fn complete(&self, id: &TileId) {
        self.inner.lock().pending.remove(id);
    }

    /// True if the tile is queued or in-flight.
    pub fn is_pending(&self, id: &TileId) -> bool {
        self.inner.lock().pending.contains(id)
    }

    /// Number of tasks waiting in the queue (excludes in-flight).
    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    /// True if no tasks are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the queue; pending and future [`next`](Self::next) calls
    /// return `None`.
    pub fn close(&self) {
        self.available.close();
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}
