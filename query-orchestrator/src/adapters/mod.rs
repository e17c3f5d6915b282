//! Backend adapters
//!
//! Each adapter turns one backend's wire format into a [`SourceResult`] and
//! never fails: transport errors, bad payloads and missed deadlines all come
//! back as failed results.

pub mod graph;
pub mod http;
pub mod intent;
pub mod vector;

pub use graph::GraphMemoryAdapter;
pub use http::{AdapterError, HttpBackend};
pub use intent::HttpIntentClassifier;
pub use vector::VectorRetrievalAdapter;

use query_orchestrator_sdk::{Intent, Query, SourceAdapter, SourceResult};
use tokio::time::Instant;
use tracing::warn;

/// Run `adapter` to completion or `deadline`, whichever comes first.
///
/// The result is always tagged with the adapter's own kind.
pub async fn settle(
    adapter: &dyn SourceAdapter,
    query: &Query,
    intent: Option<&Intent>,
    deadline: Instant,
) -> SourceResult {
    let kind = adapter.kind();
    let started = Instant::now();

    match tokio::time::timeout_at(deadline, adapter.invoke(query, intent, deadline)).await {
        Ok(mut result) => {
            if result.source_kind != kind {
                warn!(expected = %kind, reported = %result.source_kind, "adapter mislabeled its result");
                result.source_kind = kind;
            }
            result
        }
        Err(_) => {
            warn!(query_id = %query.id, source = %kind, "source missed its deadline");
            SourceResult::timed_out(kind, started.elapsed())
        }
    }
}
