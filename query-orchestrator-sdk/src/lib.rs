//! Shared vocabulary for the streaming multi-source query orchestrator.
//!
//! - **types**: queries, intents, source results, merged results, scores
//! - **run**: the per-query `RunState` and its phase machine
//! - **error**: `OrchestratorError`
//! - the `SourceAdapter`, `IntentClassifier` and `QueryRuntime` traits
//! - console logging macros for CLI progress output

mod error;
mod run;
mod types;

pub use error::{OrchestratorError, OrchestratorResult};
pub use run::{ErrorKind, Phase, RunError, RunMetrics, RunState};
pub use types::{
    ActionTier, ConfidenceBreakdown, Forecast, Intent, IntentType, MergedResult, Query,
    QueryContext, QueryId, ReasoningStep, RecommendedAction, Score, SourceKind, SourceReference,
    SourceResult,
};

// Re-export async trait for convenience
pub use async_trait::async_trait;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

/// A backend reasoning subsystem that answers a query before a deadline.
///
/// Implementations must never fail: transport errors, bad payloads and missed
/// deadlines all come back as a `SourceResult` with `succeeded == false`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which slot this adapter fills
    fn kind(&self) -> SourceKind;

    /// Ask the backend, giving up at `deadline`
    async fn invoke(&self, query: &Query, intent: Option<&Intent>, deadline: Instant)
        -> SourceResult;
}

/// Fast upstream call that labels a query before retrieval starts
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, query: &Query) -> OrchestratorResult<Intent>;
}

/// Handle to a submitted query.
///
/// Holds a snapshot subscription taken before the run's first broadcast, so
/// `wait` cannot miss the terminal snapshot.
#[derive(Debug)]
pub struct QueryHandle {
    query_id: QueryId,
    receiver: broadcast::Receiver<RunState>,
}

impl QueryHandle {
    pub fn new(query_id: QueryId, receiver: broadcast::Receiver<RunState>) -> Self {
        Self { query_id, receiver }
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    /// Wait for this query's terminal snapshot (`Complete`, `Error` or `Cancelled`).
    ///
    /// A run's terminal snapshot is always broadcast before any snapshot of a
    /// later query. Seeing a later id therefore means the terminal snapshot
    /// was lost to lag, and the wait ends with `Superseded`.
    pub async fn wait(mut self) -> OrchestratorResult<RunState> {
        loop {
            match self.receiver.recv().await {
                Ok(state) if state.query_id == self.query_id && state.is_terminal() => {
                    return Ok(state)
                }
                Ok(state) if state.query_id > self.query_id => {
                    return Err(OrchestratorError::Superseded(self.query_id))
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => {
                    return Err(OrchestratorError::ChannelClosed(self.query_id))
                }
            }
        }
    }
}

/// Runtime trait for submitting and observing queries.
/// This is the surface UI and CLI consumers program against.
#[async_trait]
pub trait QueryRuntime: Send + Sync {
    /// Start a new query, superseding any run still in flight
    async fn submit(&self, text: &str, context: QueryContext) -> OrchestratorResult<QueryHandle>;

    /// Cancel the live run; returns false when nothing was in flight
    fn cancel(&self) -> bool;

    /// Receive a `RunState` snapshot on every transition and preview update
    fn subscribe(&self) -> broadcast::Receiver<RunState>;

    /// Snapshot of the current (or last finished) run
    fn current(&self) -> Option<RunState>;

    /// Latencies of the most recently completed run
    fn metrics(&self) -> Option<RunMetrics>;
}

// ============================================================================
// Console Logging Macros (for the CLI progress printer)
// ============================================================================

/// Logs a phase transition of a query run.
///
/// # Example
/// ```
/// use query_orchestrator_sdk::{log_phase_console, Phase, QueryId};
/// log_phase_console!(QueryId(3), Phase::Querying);
/// ```
///
/// Outputs:
/// ```text
/// ═══ QUERY #3: QUERYING ═══
/// ```
#[macro_export]
macro_rules! log_phase_console {
    ($query_id:expr, $phase:expr) => {
        println!(
            "\x1b[1;36m═══ QUERY {}: {} ═══\x1b[0m",
            $query_id,
            $phase.to_string().to_uppercase()
        );
    };
}

/// Logs a settled source result.
///
/// # Example
/// ```
/// use query_orchestrator_sdk::{log_source_console, SourceKind};
/// log_source_console!(SourceKind::GraphMemory, true, "overall 0.90");
/// ```
///
/// Outputs:
/// ```text
///   ✓ graph_memory: overall 0.90
/// ```
#[macro_export]
macro_rules! log_source_console {
    ($kind:expr, $succeeded:expr, $detail:expr) => {
        if $succeeded {
            println!("\x1b[32m  ✓ {}: {}\x1b[0m", $kind, $detail);
        } else {
            println!("\x1b[31m  ✗ {}: {}\x1b[0m", $kind, $detail);
        }
    };
}

/// Logs an informational message.
///
/// # Example
/// ```
/// use query_orchestrator_sdk::log_info;
/// log_info!("Loaded config from {}", "config.yaml");
/// ```
#[macro_export]
macro_rules! log_info {
    ($message:expr) => {
        println!("\x1b[36mℹ {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[36mℹ {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs a warning message.
///
/// # Example
/// ```
/// use query_orchestrator_sdk::log_warning;
/// log_warning!("Partial result: {} missing", "vector_retrieval");
/// ```
#[macro_export]
macro_rules! log_warning {
    ($message:expr) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", format!($fmt, $($arg)*));
    };
}
