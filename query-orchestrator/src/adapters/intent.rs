//! HTTP intent classifier

use query_orchestrator_sdk::{
    async_trait, Intent, IntentClassifier, IntentType, OrchestratorError, OrchestratorResult,
    Query, QueryContext,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::http::HttpBackend;

#[derive(Debug, Serialize)]
struct IntentRequest<'a> {
    text: &'a str,
    context: &'a QueryContext,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentResponse {
    #[serde(alias = "intent_type")]
    intent_type: String,
    #[serde(default)]
    confidence: f64,
}

impl From<IntentResponse> for Intent {
    fn from(response: IntentResponse) -> Self {
        Intent::new(IntentType::from_label(&response.intent_type), response.confidence)
    }
}

/// Classifies queries against the intent endpoint.
///
/// The orchestrator bounds the call with its own deadline as well; `deadline`
/// here keeps the HTTP request from outliving it.
pub struct HttpIntentClassifier {
    backend: HttpBackend,
    deadline: Duration,
}

impl HttpIntentClassifier {
    pub fn new(backend: HttpBackend, deadline: Duration) -> Self {
        Self { backend, deadline }
    }
}

#[async_trait]
impl IntentClassifier for HttpIntentClassifier {
    async fn classify(&self, query: &Query) -> OrchestratorResult<Intent> {
        let request = IntentRequest {
            text: &query.text,
            context: &query.context,
        };
        let response: IntentResponse = self
            .backend
            .post_json(&request, Instant::now() + self.deadline)
            .await
            .map_err(|e| OrchestratorError::Classification(e.to_string()))?;

        let intent = Intent::from(response);
        debug!(query_id = %query.id, intent = %intent.intent_type, confidence = %intent.confidence, "query classified");
        Ok(intent)
    }
}
