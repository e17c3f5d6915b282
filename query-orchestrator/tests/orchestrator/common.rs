//! Common test utilities for orchestrator tests

use query_orchestrator::{Orchestrator, OrchestratorConfig};
use query_orchestrator_sdk::{
    async_trait, ConfidenceBreakdown, Intent, IntentClassifier, IntentType, OrchestratorError,
    OrchestratorResult, Query, QueryId, RunState, SourceAdapter, SourceKind, SourceResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

// ============================================================================
// Scripted Collaborators
// ============================================================================

/// What a scripted collaborator does once its delay has passed
#[derive(Clone)]
pub enum Outcome<T> {
    Respond(T),
    Fail(String),
    /// Never resolves, ignoring any deadline it was given
    Hang,
}

pub struct ScriptedAdapter {
    kind: SourceKind,
    delay: Duration,
    outcome: Outcome<SourceResult>,
    calls: AtomicUsize,
    last_intent: Mutex<Option<Intent>>,
}

impl ScriptedAdapter {
    pub fn new(kind: SourceKind, delay: Duration, outcome: Outcome<SourceResult>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            delay,
            outcome,
            calls: AtomicUsize::new(0),
            last_intent: Mutex::new(None),
        })
    }

    pub fn answering(result: SourceResult, delay: Duration) -> Arc<Self> {
        Self::new(result.source_kind, delay, Outcome::Respond(result))
    }

    pub fn failing(kind: SourceKind, delay: Duration, error: &str) -> Arc<Self> {
        Self::new(kind, delay, Outcome::Fail(error.to_string()))
    }

    pub fn hanging(kind: SourceKind) -> Arc<Self> {
        Self::new(kind, Duration::ZERO, Outcome::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_intent(&self) -> Option<Intent> {
        *self.last_intent.lock().unwrap()
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn invoke(&self, _query: &Query, intent: Option<&Intent>, _deadline: Instant) -> SourceResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_intent.lock().unwrap() = intent.copied();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.outcome {
            Outcome::Respond(result) => result.clone().with_elapsed(self.delay),
            Outcome::Fail(error) => SourceResult::failed(self.kind, error.clone()),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

pub struct ScriptedClassifier {
    delay: Duration,
    outcome: Outcome<Intent>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(delay: Duration, outcome: Outcome<Intent>) -> Arc<Self> {
        Arc::new(Self {
            delay,
            outcome,
            calls: AtomicUsize::new(0),
        })
    }

    /// Classifies everything as diagnostic after `delay`
    pub fn diagnostic(delay: Duration) -> Arc<Self> {
        Self::new(delay, Outcome::Respond(Intent::new(IntentType::Diagnostic, 0.92)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentClassifier for ScriptedClassifier {
    async fn classify(&self, _query: &Query) -> OrchestratorResult<Intent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.outcome {
            Outcome::Respond(intent) => Ok(*intent),
            Outcome::Fail(error) => Err(OrchestratorError::Classification(error.clone())),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

pub fn build(
    classifier: Arc<ScriptedClassifier>,
    graph: Arc<ScriptedAdapter>,
    vector: Arc<ScriptedAdapter>,
) -> Orchestrator {
    Orchestrator::new(classifier, graph, vector, OrchestratorConfig::default())
}

// ============================================================================
// Sample Results
// ============================================================================

pub fn graph_result(overall: f64) -> SourceResult {
    SourceResult::success(
        SourceKind::GraphMemory,
        "Two enterprise renewals slipped to Q2.",
        ConfidenceBreakdown::new(overall).with_relationship_strength(0.8),
    )
}

pub fn vector_result(overall: f64) -> SourceResult {
    SourceResult::success(
        SourceKind::VectorRetrieval,
        "Two enterprise renewals slipped to Q2. Pipeline coverage is 2.1x.",
        ConfidenceBreakdown::new(overall).with_source_reliability(0.7),
    )
}

pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Drain snapshots until `query_id` reaches a terminal phase
pub async fn collect_until_terminal(
    rx: &mut broadcast::Receiver<RunState>,
    query_id: QueryId,
) -> Vec<RunState> {
    let mut seen = Vec::new();
    loop {
        let state = rx.recv().await.expect("snapshot channel closed");
        let done = state.query_id == query_id && state.is_terminal();
        seen.push(state);
        if done {
            return seen;
        }
    }
}

// ============================================================================
// Canned HTTP Servers
// ============================================================================

/// Serve one request with a fixed response; the join handle yields the raw
/// request body.
pub async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request
    });

    (format!("http://{addr}/query"), task)
}

/// Accept one connection and never answer it
pub async fn serve_silently() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let task = tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        std::future::pending::<()>().await;
    });

    (format!("http://{addr}/query"), task)
}

/// An address nothing listens on
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/query")
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                return String::from_utf8_lossy(&buf[header_end + 4..]).into_owned();
            }
        }
    }
    String::new()
}
