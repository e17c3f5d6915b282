//! Run lifecycle: classify, fan out to both sources, merge.
//!
//! One run is live at a time. Submitting a query cancels the run in flight,
//! and every state mutation is checked against the live query id under the
//! slot lock, so a superseded run can never write into its successor.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use query_orchestrator_sdk::{
    async_trait, ErrorKind, IntentClassifier, OrchestratorError, OrchestratorResult,
    Phase, Query, QueryContext, QueryHandle, QueryId, QueryRuntime, RunMetrics, RunState,
    SourceAdapter, SourceKind, SourceResult,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::{
    settle, GraphMemoryAdapter, HttpBackend, HttpIntentClassifier, VectorRetrievalAdapter,
};
use crate::config::OrchestratorConfig;
use crate::merge::merge;
use crate::metrics::MetricsRecorder;

/// The live run plus the recorder that times it
#[derive(Default)]
struct RunSlot {
    current: Option<RunState>,
    cancel: Option<CancellationToken>,
    metrics: MetricsRecorder,
}

/// State shared between the orchestrator and its driver tasks
struct Shared {
    classifier: Arc<dyn IntentClassifier>,
    graph: Arc<dyn SourceAdapter>,
    vector: Arc<dyn SourceAdapter>,
    config: OrchestratorConfig,
    next_id: AtomicU64,
    slot: Mutex<RunSlot>,
    state_tx: broadcast::Sender<RunState>,
}

impl Shared {
    fn lock_slot(&self) -> MutexGuard<'_, RunSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate the run `query_id` and broadcast the new snapshot.
    ///
    /// Returns false without touching anything when `query_id` is no longer
    /// the live run or the run already reached a terminal phase.
    fn apply<F>(&self, query_id: QueryId, update: F) -> bool
    where
        F: FnOnce(&mut RunState, &mut MetricsRecorder) -> OrchestratorResult<()>,
    {
        let mut slot = self.lock_slot();
        let RunSlot {
            current, metrics, ..
        } = &mut *slot;

        let state = match current.as_mut() {
            Some(state) if state.query_id == query_id && !state.is_terminal() => state,
            _ => {
                debug!(query_id = %query_id, "discarding update for stale run");
                return false;
            }
        };

        let before = state.phase;
        if let Err(err) = update(state, metrics) {
            warn!(query_id = %query_id, error = %err, "run update rejected");
            return false;
        }
        if state.phase != before {
            info!(query_id = %query_id, from = %before, to = %state.phase, "phase changed");
        }
        let _ = self.state_tx.send(state.clone());
        true
    }

    /// Cancel whatever run is live. Caller holds the slot lock.
    fn cancel_live(&self, slot: &mut RunSlot) -> bool {
        let Some(state) = slot.current.as_mut().filter(|s| !s.is_terminal()) else {
            return false;
        };
        if let Some(token) = slot.cancel.take() {
            token.cancel();
        }
        if let Err(err) = state.cancel() {
            warn!(query_id = %state.query_id, error = %err, "could not cancel run");
            return false;
        }
        slot.metrics.discard(state.query_id);
        info!(query_id = %state.query_id, "run cancelled");
        let _ = self.state_tx.send(state.clone());
        true
    }

    fn fail(&self, query_id: QueryId, kind: ErrorKind, message: String) -> bool {
        warn!(query_id = %query_id, kind = %kind, %message, "run failed");
        self.apply(query_id, |state, metrics| {
            metrics.discard(query_id);
            state.fail(kind, message)
        })
    }
}

fn enter(state: &mut RunState, metrics: &mut MetricsRecorder, phase: Phase) -> OrchestratorResult<()> {
    state.transition(phase)?;
    metrics.mark(state.query_id, phase, Instant::now());
    Ok(())
}

/// Runs queries against the intent classifier and both reasoning backends
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        graph: Arc<dyn SourceAdapter>,
        vector: Arc<dyn SourceAdapter>,
        config: OrchestratorConfig,
    ) -> Self {
        if graph.kind() != SourceKind::GraphMemory || vector.kind() != SourceKind::VectorRetrieval {
            warn!(
                graph = %graph.kind(),
                vector = %vector.kind(),
                "adapters report unexpected kinds; results are slotted by reported kind"
            );
        }
        let (state_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                classifier,
                graph,
                vector,
                config,
                next_id: AtomicU64::new(0),
                slot: Mutex::new(RunSlot::default()),
                state_tx,
            }),
        }
    }

    /// Orchestrator wired to the HTTP backends named in `config`
    pub fn with_http_backends(config: OrchestratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("query-orchestrator/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_http_client(config, client))
    }

    /// Same as [`Orchestrator::with_http_backends`] with a caller-supplied client
    pub fn with_http_client(config: OrchestratorConfig, client: reqwest::Client) -> Self {
        let endpoints = &config.endpoints;
        let classifier = HttpIntentClassifier::new(
            HttpBackend::new(client.clone(), &endpoints.intent_url),
            config.intent_deadline(),
        );
        let graph = GraphMemoryAdapter::new(
            HttpBackend::new(client.clone(), &endpoints.graph_url),
            config.include_partial,
        );
        let vector = VectorRetrievalAdapter::new(
            HttpBackend::new(client, &endpoints.vector_url),
            config.include_partial,
        );

        Self::new(
            Arc::new(classifier),
            Arc::new(graph),
            Arc::new(vector),
            config,
        )
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    /// Phase of the current run; `Idle` before the first submit
    pub fn phase(&self) -> Phase {
        self.shared
            .lock_slot()
            .current
            .as_ref()
            .map_or(Phase::Idle, |state| state.phase)
    }
}

#[async_trait]
impl QueryRuntime for Orchestrator {
    async fn submit(&self, text: &str, context: QueryContext) -> OrchestratorResult<QueryHandle> {
        let text = text.trim();
        if text.is_empty() {
            return Err(OrchestratorError::EmptyQuery);
        }

        let shared = &self.shared;
        let token = CancellationToken::new();
        let (query, handle) = {
            let mut slot = shared.lock_slot();
            let id = QueryId(shared.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            let query = Query::new(id, text, context);

            shared.cancel_live(&mut slot);

            // subscribe before the first snapshot goes out
            let handle = QueryHandle::new(id, shared.state_tx.subscribe());
            let state = RunState::new(&query);
            slot.metrics.begin(id, Instant::now());
            slot.current = Some(state.clone());
            slot.cancel = Some(token.clone());
            let _ = shared.state_tx.send(state);
            (query, handle)
        };

        info!(query_id = %query.id, "query submitted");
        tokio::spawn(drive(Arc::clone(&self.shared), query, token));
        Ok(handle)
    }

    fn cancel(&self) -> bool {
        let mut slot = self.shared.lock_slot();
        self.shared.cancel_live(&mut slot)
    }

    fn subscribe(&self) -> broadcast::Receiver<RunState> {
        self.shared.state_tx.subscribe()
    }

    fn current(&self) -> Option<RunState> {
        self.shared.lock_slot().current.clone()
    }

    fn metrics(&self) -> Option<RunMetrics> {
        self.shared.lock_slot().metrics.metrics()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        let mut slot = self.shared.lock_slot();
        self.shared.cancel_live(&mut slot);
    }
}

async fn drive(shared: Arc<Shared>, query: Query, token: CancellationToken) {
    tokio::select! {
        biased;
        _ = token.cancelled() => {
            debug!(query_id = %query.id, "driver stopped by cancellation");
        }
        _ = run_phases(&shared, &query) => {}
    }
}

async fn run_phases(shared: &Shared, query: &Query) {
    let id = query.id;
    let config = &shared.config;

    // Classifying
    let intent_deadline = config.intent_deadline();
    let classified = tokio::time::timeout(intent_deadline, shared.classifier.classify(query)).await;
    let intent = match classified {
        Ok(Ok(intent)) => intent,
        Ok(Err(err)) => {
            shared.fail(id, ErrorKind::IntentClassificationFailed, err.to_string());
            return;
        }
        Err(_) => {
            let message = format!(
                "intent classification exceeded {}ms deadline",
                intent_deadline.as_millis()
            );
            shared.fail(id, ErrorKind::IntentClassificationFailed, message);
            return;
        }
    };

    if !shared.apply(id, |state, metrics| {
        state.intent = Some(intent);
        enter(state, metrics, Phase::Querying)
    }) {
        return;
    }

    // Querying
    let started = Instant::now();
    let source_deadline = started + config.source_deadline();
    let overall = tokio::time::sleep_until(started + config.querying_deadline());
    tokio::pin!(overall);

    let mut pending: FuturesUnordered<BoxFuture<'_, SourceResult>> = FuturesUnordered::new();
    for adapter in [&shared.graph, &shared.vector] {
        let adapter = Arc::clone(adapter);
        pending.push(
            async move { settle(adapter.as_ref(), query, Some(&intent), source_deadline).await }
                .boxed(),
        );
    }

    while !pending.is_empty() {
        tokio::select! {
            Some(result) = pending.next() => {
                debug!(
                    query_id = %id,
                    source = %result.source_kind,
                    succeeded = result.succeeded,
                    "source settled"
                );
                let applied = shared.apply(id, |state, _| {
                    state.record_source(result);
                    state.preview = Some(merge(
                        state.graph_result.as_ref(),
                        state.vector_result.as_ref(),
                    ));
                    Ok(())
                });
                if !applied {
                    return;
                }
            }
            _ = &mut overall => {
                warn!(query_id = %id, outstanding = pending.len(), "querying deadline reached");
                break;
            }
        }
    }
    drop(pending);

    let waited = started.elapsed();
    if !shared.apply(id, |state, metrics| {
        for kind in state.pending_sources() {
            state.record_source(SourceResult::timed_out(kind, waited));
        }
        enter(state, metrics, Phase::Merging)
    }) {
        return;
    }

    // Merging
    shared.apply(id, |state, metrics| {
        let settled: Vec<&SourceResult> = SourceKind::ALL
            .iter()
            .filter_map(|kind| state.source(*kind))
            .collect();
        if settled.iter().all(|result| !result.succeeded) {
            let message = settled
                .iter()
                .map(|r| {
                    format!(
                        "{}: {}",
                        r.source_kind,
                        r.error.as_deref().unwrap_or("no result")
                    )
                })
                .collect::<Vec<_>>()
                .join("; ");
            warn!(query_id = %id, %message, "all sources failed");
            metrics.discard(id);
            return state.fail(ErrorKind::AllSourcesFailed, message);
        }

        let merged = merge(state.graph_result.as_ref(), state.vector_result.as_ref());
        if merged.degraded {
            warn!(query_id = %id, missing = ?merged.missing_sources, "answer degraded");
        }
        state.merged_result = Some(merged);
        enter(state, metrics, Phase::Complete)?;
        metrics.finish(id);
        Ok(())
    });
}
