// Backend adapters (intent, graph, vector)
pub mod adapters;

// Command-line surface
pub mod cli;

// Configuration loading
pub mod config;

// Confidence-scored merge of source results
pub mod merge;

// Per-phase latency recording
pub mod metrics;

// Run lifecycle
pub mod orchestrator;

pub use config::OrchestratorConfig;
pub use merge::{merge, merge_results};
pub use orchestrator::Orchestrator;
