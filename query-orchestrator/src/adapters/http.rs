//! Shared JSON-over-HTTP plumbing for the backend adapters

use query_orchestrator_sdk::{Forecast, Score, SourceKind, SourceResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

const MAX_ERROR_BODY: usize = 200;

/// Why a backend call did not produce a usable payload
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("deadline exceeded after {0}ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode backend response: {0}")]
    Decode(String),

    /// Backend answered 200 but reported its own failure in the body
    #[error("backend reported failure: {0}")]
    Backend(String),
}

/// One backend endpoint reached with POST + JSON
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST `body` and decode the response, giving up at `deadline`
    pub async fn post_json<Req, Resp>(&self, body: &Req, deadline: Instant) -> Result<Resp, AdapterError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let started = Instant::now();
        let request = async {
            let response = self.client.post(&self.endpoint).json(body).send().await?;
            let status = response.status();
            let bytes = response.bytes().await?;
            if !status.is_success() {
                return Err(AdapterError::Status {
                    status: status.as_u16(),
                    body: truncate(&String::from_utf8_lossy(&bytes)),
                });
            }
            serde_json::from_slice(&bytes).map_err(|e| AdapterError::Decode(e.to_string()))
        };

        match tokio::time::timeout_at(deadline, request).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout(started.elapsed().as_millis() as u64)),
        }
    }
}

/// Normalize an adapter error into a failed result
pub(crate) fn failed_result(kind: SourceKind, endpoint: &str, error: AdapterError) -> SourceResult {
    warn!(source = %kind, endpoint, error = %error, "source call failed");
    match error {
        AdapterError::Timeout(ms) => SourceResult::timed_out(kind, Duration::from_millis(ms)),
        other => SourceResult::failed(kind, other.to_string()),
    }
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

/// Forecast payload; both backends use the same shape modulo casing
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireForecast {
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub horizon: String,
    #[serde(alias = "predictedValue")]
    pub predicted_value: f64,
    #[serde(default)]
    pub probability: f64,
}

impl From<WireForecast> for Forecast {
    fn from(wire: WireForecast) -> Self {
        Forecast {
            metric: wire.metric,
            horizon: wire.horizon,
            predicted_value: wire.predicted_value,
            probability: Score::new(wire.probability),
        }
    }
}
