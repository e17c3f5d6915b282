//! Error types for the orchestrator SDK

use thiserror::Error;

use crate::run::Phase;
use crate::types::QueryId;

/// Errors surfaced by orchestrator operations.
///
/// Backend failures are not represented here: source adapters normalize them
/// into failed `SourceResult`s and never propagate them.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Submitted text was empty or whitespace
    #[error("query text is empty")]
    EmptyQuery,

    /// A phase transition that the run state machine does not allow
    #[error("invalid phase transition from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },

    /// Intent classification backend failed
    #[error("intent classification failed: {0}")]
    Classification(String),

    /// The snapshot channel closed before the run finished
    #[error("run state channel closed before query {0} reached a terminal phase")]
    ChannelClosed(QueryId),

    /// A newer query started and this run's terminal snapshot was not observed
    #[error("query {0} was superseded before its outcome was observed")]
    Superseded(QueryId),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
