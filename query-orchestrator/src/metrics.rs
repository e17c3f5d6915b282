//! Per-phase latency recording
//!
//! Uses `tokio::time::Instant` so tests running with paused time see virtual
//! latencies.

use query_orchestrator_sdk::{Phase, QueryId, RunMetrics};
use std::collections::HashMap;
use tokio::time::Instant;

/// Phase entry instants of the live run
#[derive(Debug)]
struct PhaseClock {
    query_id: QueryId,
    marks: HashMap<Phase, Instant>,
}

/// Records phase timestamps for the live run and keeps the metrics of the most
/// recently completed one.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    live: Option<PhaseClock>,
    completed: Option<RunMetrics>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing a new run. Metrics of any earlier run are discarded.
    pub fn begin(&mut self, query_id: QueryId, at: Instant) {
        let mut marks = HashMap::new();
        marks.insert(Phase::Classifying, at);
        self.live = Some(PhaseClock { query_id, marks });
        self.completed = None;
    }

    /// Record entry into `phase`. Ignored unless `query_id` is the live run.
    pub fn mark(&mut self, query_id: QueryId, phase: Phase, at: Instant) -> bool {
        match self.live.as_mut() {
            Some(clock) if clock.query_id == query_id => {
                clock.marks.insert(phase, at);
                true
            }
            _ => false,
        }
    }

    /// Close the live run after `Complete` and publish its metrics.
    ///
    /// Returns `None` when `query_id` is not live or a phase mark is missing.
    pub fn finish(&mut self, query_id: QueryId) -> Option<RunMetrics> {
        let clock = match self.live.take() {
            Some(clock) if clock.query_id == query_id => clock,
            other => {
                self.live = other;
                return None;
            }
        };

        let at = |phase: Phase| clock.marks.get(&phase).copied();
        let classifying = at(Phase::Classifying)?;
        let querying = at(Phase::Querying)?;
        let merging = at(Phase::Merging)?;
        let complete = at(Phase::Complete)?;

        let metrics = RunMetrics {
            query_id,
            intent_latency_ms: millis_between(classifying, querying),
            query_latency_ms: millis_between(querying, merging),
            merge_latency_ms: millis_between(merging, complete),
            total_latency_ms: millis_between(classifying, complete),
        };
        self.completed = Some(metrics);
        Some(metrics)
    }

    /// Drop the live run without publishing (error or cancellation)
    pub fn discard(&mut self, query_id: QueryId) {
        if self
            .live
            .as_ref()
            .is_some_and(|clock| clock.query_id == query_id)
        {
            self.live = None;
        }
    }

    /// Metrics of the most recently completed run, if it has not been superseded
    pub fn metrics(&self) -> Option<RunMetrics> {
        self.completed
    }
}

fn millis_between(start: Instant, end: Instant) -> u64 {
    end.saturating_duration_since(start).as_millis() as u64
}
