//! Vector/retrieval reasoner adapter (snake_case wire format)

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
struct VectorQueryRequest<'a> {
    text: &'a str,
    context: &'a QueryContext,
    include_partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    intent: Option<IntentType>,
}

#[derive(Debug, Default, Deserialize)]
struct VectorScores {
    #[serde(default)]
    overall: f64,
    freshness: Option<f64>,
    source_reliability: Option<f64>,
    historical_accuracy: Option<f64>,
    entity_completeness: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct VectorDocument {
    doc_id: String,
    #[serde(default)]
    title: String,
    url: Option<String>,
    chunk: Option<String>,
    similarity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct VectorRecommendation {
    action_type: String,
    #[serde(default)]
    tier: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    confidence: f64,
}

/// Response body of the vector backend
#[derive(Debug, Deserialize)]
pub(crate) struct VectorQueryResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    scores: VectorScores,
    #[serde(default)]
    documents: Vec<VectorDocument>,
    #[serde(default)]
    steps: Vec<String>,
    #[serde(default)]
    recommendations: Vec<VectorRecommendation>,
    forecast: Option<WireForecast>,
    status: Option<String>,
    message: Option<String>,
}

impl VectorQueryResponse {
    pub(crate) fn into_source_result(self) -> Result<SourceResult, AdapterError> {
        if self.status.as_deref() == Some("error") {
            let message = self
                .message
                .unwrap_or_else(|| "unspecified retrieval error".to_string());
            return Err(AdapterError::Backend(message));
        }

        let s = self.scores;
        let confidence = ConfidenceBreakdown {
            overall: Score::new(s.overall),
            freshness: s.freshness.map(Score::new),
            source_reliability: s.source_reliability.map(Score::new),
            historical_accuracy: s.historical_accuracy.map(Score::new),
            entity_completeness: s.entity_completeness.map(Score::new),
            ..Default::default()
        };

        let sources = self
            .documents
            .into_iter()
            .map(|d| SourceReference {
                id: d.doc_id,
                title: d.title,
                url: d.url,
                excerpt: d.chunk,
                relevance: d.similarity.map(Score::new),
            })
            .collect();

        let trace = self
            .steps
            .into_iter()
            .zip(1u32..)
            .map(|(description, step)| ReasoningStep::new(step, description))
            .collect();

        let actions = self
            .recommendations
            .into_iter()
            .map(|r| {
                RecommendedAction::new(
                    r.action_type,
                    ActionTier::from_label(&r.tier),
                    r.description,
                    r.confidence,
                )
            })
            .collect();

        let mut result =
            SourceResult::success(SourceKind::VectorRetrieval, self.response, confidence)
                .with_sources(sources)
                .with_trace(trace)
                .with_actions(actions);
        if let Some(forecast) = self.forecast {
            result = result.with_forecast(forecast.into());
        }
        Ok(result)
    }
}

/// Calls the vector/retrieval reasoner
pub struct VectorRetrievalAdapter {
    backend: HttpBackend,
    include_partial: bool,
}

impl VectorRetrievalAdapter {
    pub fn new(backend: HttpBackend, include_partial: bool) -> Self {
        Self {
            backend,
            include_partial,
        }
    }
}

#[async_trait]
impl SourceAdapter for VectorRetrievalAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::VectorRetrieval
    }

    async fn invoke(
        &self,
        query: &Query,
        intent: Option<&Intent>,
        deadline: Instant,
    ) -> SourceResult {
        let started = Instant::now();
        let request = VectorQueryRequest {
            text: &query.text,
            context: &query.context,
            include_partial: self.include_partial,
            intent: intent.map(|i| i.intent_type),
        };

        let outcome = self
            .backend
            .post_json::<_, VectorQueryResponse>(&request, deadline)
            .await
            .and_then(VectorQueryResponse::into_source_result);

        match outcome {
            Ok(result) => {
                debug!(
                    query_id = %query.id,
                    documents = result.sources.len(),
                    "vector reasoner answered"
                );
                result.with_elapsed(started.elapsed())
            }
            Err(error) => failed_result(self.kind(), self.backend.endpoint(), error),
        }
    }
}
