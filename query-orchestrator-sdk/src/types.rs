//! Result types shared by the orchestrator, its source adapters and callers.
//!
//! Everything here is plain data. The one rule enforced at construction time is
//! that confidence values live in `[0, 1]`: backends are noisy, so an
//! out-of-range value is clamped through [`Score`] rather than rejected.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::run::ErrorKind;

// ============================================================================
// Scores
// ============================================================================

/// A confidence or probability value clamped to `[0, 1]`.
///
/// Every construction path clamps, including deserialization, so a `Score`
/// can never hold an out-of-range value. `NaN` becomes `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Score(f64);

impl Score {
    pub const ZERO: Score = Score(0.0);
    pub const ONE: Score = Score(1.0);

    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Arithmetic mean of two scores.
    pub fn mean(a: Score, b: Score) -> Score {
        Score::new((a.0 + b.0) / 2.0)
    }
}

impl From<f64> for Score {
    fn from(value: f64) -> Self {
        Score::new(value)
    }
}

impl From<Score> for f64 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ============================================================================
// Query & Intent
// ============================================================================

/// Generation counter identifying one submitted query.
///
/// Ids increase monotonically; a query with a higher id supersedes every
/// query with a lower one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct QueryId(pub u64);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Free-form key/value context attached to a query (portfolio id, page, ...)
pub type QueryContext = BTreeMap<String, String>;

/// A submitted question. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: QueryId,
    pub text: String,
    #[serde(default)]
    pub context: QueryContext,
}

impl Query {
    pub fn new(id: QueryId, text: impl Into<String>, context: QueryContext) -> Self {
        Self {
            id,
            text: text.into(),
            context,
        }
    }
}

/// Label produced by intent classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    /// "Why is X happening?"
    Diagnostic,
    /// "What will X look like next quarter?"
    Forecast,
    /// "What should we do about X?"
    Recommendation,
    /// "How does X compare with Y?"
    Comparison,
    /// "Where does X stand?"
    Status,
    /// Open-ended browsing questions
    Exploratory,
    /// Backend returned a label this build does not know
    Unknown,
}

impl IntentType {
    /// Map a backend label to an intent type; unrecognised labels become `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "diagnostic" | "diagnosis" | "root_cause" => IntentType::Diagnostic,
            "forecast" | "prediction" => IntentType::Forecast,
            "recommendation" | "action" => IntentType::Recommendation,
            "comparison" | "compare" => IntentType::Comparison,
            "status" | "lookup" => IntentType::Status,
            "exploratory" | "explore" => IntentType::Exploratory,
            _ => IntentType::Unknown,
        }
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IntentType::Diagnostic => "diagnostic",
            IntentType::Forecast => "forecast",
            IntentType::Recommendation => "recommendation",
            IntentType::Comparison => "comparison",
            IntentType::Status => "status",
            IntentType::Exploratory => "exploratory",
            IntentType::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Classified intent of a query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub intent_type: IntentType,
    pub confidence: Score,
}

impl Intent {
    pub fn new(intent_type: IntentType, confidence: f64) -> Self {
        Self {
            intent_type,
            confidence: Score::new(confidence),
        }
    }
}

// ============================================================================
// Source Results
// ============================================================================

/// Which backend reasoning subsystem produced a result
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    GraphMemory,
    VectorRetrieval,
}

impl SourceKind {
    /// Both kinds, in merge priority order (graph first).
    pub const ALL: [SourceKind; 2] = [SourceKind::GraphMemory, SourceKind::VectorRetrieval];
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::GraphMemory => f.write_str("graph_memory"),
            SourceKind::VectorRetrieval => f.write_str("vector_retrieval"),
        }
    }
}

/// Confidence breakdown reported by a source, or aggregated by the merge.
///
/// `overall` is always present. The sub-components are optional because each
/// backend only populates some of them: the graph reasoner reports
/// `relationship_strength`, the vector reasoner reports `source_reliability`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub overall: Score,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_strength: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_reliability: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_accuracy: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_completeness: Option<Score>,
}

impl ConfidenceBreakdown {
    pub fn new(overall: f64) -> Self {
        Self {
            overall: Score::new(overall),
            ..Default::default()
        }
    }

    pub fn with_freshness(mut self, value: f64) -> Self {
        self.freshness = Some(Score::new(value));
        self
    }

    pub fn with_relationship_strength(mut self, value: f64) -> Self {
        self.relationship_strength = Some(Score::new(value));
        self
    }

    pub fn with_source_reliability(mut self, value: f64) -> Self {
        self.source_reliability = Some(Score::new(value));
        self
    }

    pub fn with_historical_accuracy(mut self, value: f64) -> Self {
        self.historical_accuracy = Some(Score::new(value));
        self
    }

    pub fn with_entity_completeness(mut self, value: f64) -> Self {
        self.entity_completeness = Some(Score::new(value));
        self
    }

    /// All populated components, `overall` first.
    pub fn components(&self) -> Vec<Score> {
        let mut scores = vec![self.overall];
        scores.extend(
            [
                self.freshness,
                self.relationship_strength,
                self.source_reliability,
                self.historical_accuracy,
                self.entity_completeness,
            ]
            .into_iter()
            .flatten(),
        );
        scores
    }
}

/// A document, node or record a source cites
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<Score>,
}

impl SourceReference {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: None,
            excerpt: None,
            relevance: None,
        }
    }
}

/// One step of a reasoning trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// 1-based position in the trace
    pub step: u32,
    pub description: String,
    /// Source that produced the step (set when traces are merged)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<SourceKind>,
}

impl ReasoningStep {
    pub fn new(step: u32, description: impl Into<String>) -> Self {
        Self {
            step,
            description: description.into(),
            origin: None,
        }
    }
}

/// Urgency bucket of a recommended action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTier {
    Immediate,
    ShortTerm,
    LongTerm,
}

impl ActionTier {
    /// Map a backend tier label; unknown labels fall back to `ShortTerm`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "immediate" | "now" | "urgent" => ActionTier::Immediate,
            "long_term" | "strategic" | "later" => ActionTier::LongTerm,
            _ => ActionTier::ShortTerm,
        }
    }
}

/// An action a source recommends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub action_type: String,
    pub tier: ActionTier,
    pub description: String,
    pub confidence: Score,
}

impl RecommendedAction {
    pub fn new(
        action_type: impl Into<String>,
        tier: ActionTier,
        description: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            tier,
            description: description.into(),
            confidence: Score::new(confidence),
        }
    }

    /// Key used to detect the same action coming from both sources
    pub fn dedup_key(&self) -> (&str, ActionTier) {
        (self.action_type.as_str(), self.tier)
    }
}

/// A numeric forecast attached to an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub metric: String,
    pub horizon: String,
    pub predicted_value: f64,
    pub probability: Score,
}

/// Normalized result from one reasoning subsystem.
///
/// A failed result (`succeeded == false`) carries an `error` and leaves every
/// other optional or list field empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    pub source_kind: SourceKind,
    pub answer_text: String,
    pub confidence: ConfidenceBreakdown,
    #[serde(default)]
    pub sources: Vec<SourceReference>,
    #[serde(default)]
    pub reasoning_trace: Vec<ReasoningStep>,
    #[serde(default)]
    pub recommended_actions: Vec<RecommendedAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<Forecast>,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set only by [`SourceResult::timed_out`]
    #[serde(default)]
    pub timed_out: bool,
    /// Wall time the adapter spent, when it measured it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl SourceResult {
    pub fn success(
        source_kind: SourceKind,
        answer_text: impl Into<String>,
        confidence: ConfidenceBreakdown,
    ) -> Self {
        Self {
            source_kind,
            answer_text: answer_text.into(),
            confidence,
            sources: Vec::new(),
            reasoning_trace: Vec::new(),
            recommended_actions: Vec::new(),
            forecast: None,
            succeeded: true,
            error: None,
            timed_out: false,
            elapsed_ms: None,
        }
    }

    pub fn failed(source_kind: SourceKind, error: impl Into<String>) -> Self {
        Self {
            source_kind,
            answer_text: String::new(),
            confidence: ConfidenceBreakdown::default(),
            sources: Vec::new(),
            reasoning_trace: Vec::new(),
            recommended_actions: Vec::new(),
            forecast: None,
            succeeded: false,
            error: Some(error.into()),
            timed_out: false,
            elapsed_ms: None,
        }
    }

    /// Failed result for a source that missed its deadline
    pub fn timed_out(source_kind: SourceKind, after: Duration) -> Self {
        let mut result = Self::failed(
            source_kind,
            format!("deadline exceeded after {}ms", after.as_millis()),
        )
        .with_elapsed(after);
        result.timed_out = true;
        result
    }

    pub fn with_sources(mut self, sources: Vec<SourceReference>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_trace(mut self, trace: Vec<ReasoningStep>) -> Self {
        self.reasoning_trace = trace;
        self
    }

    pub fn with_actions(mut self, actions: Vec<RecommendedAction>) -> Self {
        self.recommended_actions = actions;
        self
    }

    pub fn with_forecast(mut self, forecast: Forecast) -> Self {
        self.forecast = Some(forecast);
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = Some(elapsed.as_millis() as u64);
        self
    }

    pub fn is_timeout(&self) -> bool {
        !self.succeeded && self.timed_out
    }
}

// ============================================================================
// Merged Result
// ============================================================================

/// The single answer surfaced to the caller
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MergedResult {
    pub answer_text: String,
    pub confidence: ConfidenceBreakdown,
    #[serde(default)]
    pub sources: Vec<SourceReference>,
    #[serde(default)]
    pub reasoning_trace: Vec<ReasoningStep>,
    #[serde(default)]
    pub recommended_actions: Vec<RecommendedAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<Forecast>,
    /// True when fewer than two sources contributed
    pub degraded: bool,
    #[serde(default)]
    pub missing_sources: Vec<SourceKind>,
    #[serde(default)]
    pub contributing_sources: Vec<SourceKind>,
}

impl MergedResult {
    /// Soft warning for a degraded answer that still has content
    pub fn partial_failure(&self) -> Option<ErrorKind> {
        if self.degraded && !self.contributing_sources.is_empty() {
            Some(ErrorKind::PartialSourceFailure)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contributing_sources.is_empty()
    }
}
