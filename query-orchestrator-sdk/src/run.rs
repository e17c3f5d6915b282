//! Live orchestration record and its phase machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::{Intent, MergedResult, Query, QueryId, SourceKind, SourceResult};

/// Phase of a query run.
///
/// The happy path is `Classifying → Querying → Merging → Complete`. `Error` and
/// `Cancelled` are reachable from any non-terminal phase. `Idle` is only ever
/// reported by the orchestrator when no run exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Classifying,
    Querying,
    Merging,
    Complete,
    Error,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Error | Phase::Cancelled)
    }

    /// Whether `self → to` is a legal transition
    pub fn can_transition_to(self, to: Phase) -> bool {
        if self.is_terminal() || to == Phase::Idle {
            return false;
        }
        match to {
            Phase::Error | Phase::Cancelled => true,
            _ => to > self,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Idle => "idle",
            Phase::Classifying => "classifying",
            Phase::Querying => "querying",
            Phase::Merging => "merging",
            Phase::Complete => "complete",
            Phase::Error => "error",
            Phase::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Kinds of failure a run can report.
///
/// `PartialSourceFailure` is never stored as a run error; it is the soft
/// warning attached to a degraded merged result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    IntentClassificationFailed,
    AllSourcesFailed,
    PartialSourceFailure,
}

impl ErrorKind {
    pub fn is_fatal(self) -> bool {
        !matches!(self, ErrorKind::PartialSourceFailure)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::IntentClassificationFailed => "intent classification failed",
            ErrorKind::AllSourcesFailed => "all sources failed",
            ErrorKind::PartialSourceFailure => "partial source failure",
        };
        f.write_str(label)
    }
}

/// Terminal failure of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Orchestration record for one query.
///
/// Only the orchestrator mutates a `RunState`; everyone else sees cloned
/// snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub query_id: QueryId,
    pub query_text: String,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_result: Option<SourceResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_result: Option<SourceResult>,
    /// Advisory merge of whatever has settled so far, refreshed during `Querying`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<MergedResult>,
    /// Final merge, set only on `Complete`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_result: Option<MergedResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    pub timestamps: BTreeMap<Phase, DateTime<Utc>>,
}

impl RunState {
    /// New run in `Classifying`, stamped now
    pub fn new(query: &Query) -> Self {
        let mut timestamps = BTreeMap::new();
        timestamps.insert(Phase::Classifying, Utc::now());
        Self {
            query_id: query.id,
            query_text: query.text.clone(),
            phase: Phase::Classifying,
            intent: None,
            graph_result: None,
            vector_result: None,
            preview: None,
            merged_result: None,
            error: None,
            timestamps,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Move to `to`, stamping the transition
    pub fn transition(&mut self, to: Phase) -> OrchestratorResult<()> {
        if !self.phase.can_transition_to(to) {
            return Err(OrchestratorError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        self.timestamps.insert(to, Utc::now());
        Ok(())
    }

    /// Terminate with a fatal error
    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) -> OrchestratorResult<()> {
        self.transition(Phase::Error)?;
        self.error = Some(RunError {
            kind,
            message: message.into(),
        });
        Ok(())
    }

    pub fn cancel(&mut self) -> OrchestratorResult<()> {
        self.transition(Phase::Cancelled)
    }

    /// Store a settled source result in its slot
    pub fn record_source(&mut self, result: SourceResult) {
        match result.source_kind {
            SourceKind::GraphMemory => self.graph_result = Some(result),
            SourceKind::VectorRetrieval => self.vector_result = Some(result),
        }
    }

    pub fn source(&self, kind: SourceKind) -> Option<&SourceResult> {
        match kind {
            SourceKind::GraphMemory => self.graph_result.as_ref(),
            SourceKind::VectorRetrieval => self.vector_result.as_ref(),
        }
    }

    /// Kinds that have not settled yet
    pub fn pending_sources(&self) -> Vec<SourceKind> {
        SourceKind::ALL
            .into_iter()
            .filter(|kind| self.source(*kind).is_none())
            .collect()
    }

    pub fn entered_at(&self, phase: Phase) -> Option<DateTime<Utc>> {
        self.timestamps.get(&phase).copied()
    }
}

/// Per-phase latency of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub query_id: QueryId,
    /// `t(querying) - t(classifying)`
    pub intent_latency_ms: u64,
    /// `t(merging) - t(querying)`
    pub query_latency_ms: u64,
    /// `t(complete) - t(merging)`
    pub merge_latency_ms: u64,
    /// `t(complete) - t(classifying)`
    pub total_latency_ms: u64,
}
