//! Graph/memory reasoner adapter
//!
//! The graph backend speaks camelCase and reports `relationshipStrength`.

use query_orchestrator_sdk::{
    async_trait, ActionTier, ConfidenceBreakdown, Intent, IntentType, Query, QueryContext,
    ReasoningStep, RecommendedAction, Score, SourceAdapter, SourceKind, SourceReference,
    SourceResult,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use super::http::{failed_result, AdapterError, HttpBackend, WireForecast};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphQueryRequest<'a> {
    text: &'a str,
    context: &'a QueryContext,
    include_partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    intent: Option<IntentType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphConfidence {
    #[serde(default)]
    overall: f64,
    freshness: Option<f64>,
    relationship_strength: Option<f64>,
    historical_accuracy: Option<f64>,
    entity_completeness: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphEvidence {
    node_id: String,
    #[serde(default)]
    label: String,
    link: Option<String>,
    snippet: Option<String>,
    weight: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GraphHop {
    explanation: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAction {
    #[serde(rename = "type")]
    action_type: String,
    #[serde(default)]
    tier: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    confidence: f64,
}

/// Response body of the graph backend
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphQueryResponse {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    confidence: GraphConfidence,
    #[serde(default)]
    evidence: Vec<GraphEvidence>,
    #[serde(default)]
    reasoning_path: Vec<GraphHop>,
    #[serde(default)]
    actions: Vec<GraphAction>,
    forecast: Option<WireForecast>,
    error: Option<String>,
}

impl GraphQueryResponse {
    pub(crate) fn into_source_result(self) -> Result<SourceResult, AdapterError> {
        if let Some(error) = self.error {
            return Err(AdapterError::Backend(error));
        }

        let c = self.confidence;
        let mut confidence = ConfidenceBreakdown::new(c.overall);
        confidence.freshness = c.freshness.map(Score::new);
        confidence.relationship_strength = c.relationship_strength.map(Score::new);
        confidence.historical_accuracy = c.historical_accuracy.map(Score::new);
        confidence.entity_completeness = c.entity_completeness.map(Score::new);

        let sources = self
            .evidence
            .into_iter()
            .map(|e| SourceReference {
                id: e.node_id,
                title: e.label,
                url: e.link,
                excerpt: e.snippet,
                relevance: e.weight.map(Score::new),
            })
            .collect();

        let trace = self
            .reasoning_path
            .into_iter()
            .enumerate()
            .map(|(idx, hop)| ReasoningStep::new(idx as u32 + 1, hop.explanation))
            .collect();

        let actions = self
            .actions
            .into_iter()
            .map(|a| {
                RecommendedAction::new(
                    a.action_type,
                    ActionTier::from_label(&a.tier),
                    a.title,
                    a.confidence,
                )
            })
            .collect();

        let mut result = SourceResult::success(SourceKind::GraphMemory, self.answer, confidence)
            .with_sources(sources)
            .with_trace(trace)
            .with_actions(actions);
        if let Some(forecast) = self.forecast {
            result = result.with_forecast(forecast.into());
        }
        Ok(result)
    }
}

/// Calls the graph/memory reasoner
pub struct GraphMemoryAdapter {
    backend: HttpBackend,
    include_partial: bool,
}

impl GraphMemoryAdapter {
    pub fn new(backend: HttpBackend, include_partial: bool) -> Self {
        Self {
            backend,
            include_partial,
        }
    }
}

#[async_trait]
impl SourceAdapter for GraphMemoryAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::GraphMemory
    }

    async fn invoke(
        &self,
        query: &Query,
        intent: Option<&Intent>,
        deadline: Instant,
    ) -> SourceResult {
        let started = Instant::now();
        let request = GraphQueryRequest {
            text: &query.text,
            context: &query.context,
            include_partial: self.include_partial,
            intent: intent.map(|i| i.intent_type),
        };

        let outcome = self
            .backend
            .post_json::<_, GraphQueryResponse>(&request, deadline)
            .await
            .and_then(GraphQueryResponse::into_source_result);

        match outcome {
            Ok(result) => {
                debug!(query_id = %query.id, overall = %result.confidence.overall, "graph reasoner answered");
                result.with_elapsed(started.elapsed())
            }
            Err(error) => failed_result(self.kind(), self.backend.endpoint(), error),
        }
    }
}
