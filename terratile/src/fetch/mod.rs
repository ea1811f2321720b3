//! Asynchronous tile retrieval.
//!
//! The render thread enqueues [`FetchTask`]s into a [`RequestQueue`]
//! ordered by distance-to-viewer; a bounded [`RetrievalWorkerPool`]
//! drains it, performing network I/O and handing payloads to the
//! post-processor. Only workers block on I/O.

mod http;
mod queue;
mod worker;

pub use http::{BoxFuture, FetchError, FetchResponse, HttpClient, ReqwestClient};
pub use queue::{compare_queued, FetchTask, QueuedFetch, RequestQueue};
pub use worker::{RetrievalWorkerPool, TileEvent, TileOutcome, WorkerContext};

#[cfg(test)]
pub use http::tests::MockHttpClient;
