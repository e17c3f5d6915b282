//! CLI argument parsing and answer rendering

use clap::{Parser, Subcommand};
use query_orchestrator_sdk::{Phase, RunMetrics, RunState};
use std::fmt::Write;
use std::path::PathBuf;

/// Query Orchestrator CLI Arguments
#[derive(Parser, Debug)]
#[command(
    name = "query-orchestrator",
    version,
    about = "Ask one question of the graph and vector reasoners and get a single merged answer"
)]
pub struct Args {
    /// YAML config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask a question and stream progress until the merged answer arrives
    Ask {
        /// Question text
        #[arg(required = true)]
        question: Vec<String>,

        /// Context entry as key=value (repeatable)
        #[arg(short = 'c', long = "context", value_parser = parse_context_pair)]
        context: Vec<(String, String)>,

        /// Print the terminal run state and metrics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as YAML
    Config,
}

/// Parse a `key=value` context entry
pub fn parse_context_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("context key is empty in '{raw}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Human-readable report of a finished run
pub fn render_answer(state: &RunState, metrics: Option<&RunMetrics>) -> String {
    let mut out = String::new();

    match state.phase {
        Phase::Error => {
            if let Some(error) = &state.error {
                let _ = writeln!(out, "Query failed ({}): {}", error.kind, error.message);
            }
            return out;
        }
        Phase::Cancelled => {
            let _ = writeln!(out, "Query {} was cancelled", state.query_id);
            return out;
        }
        _ => {}
    }

    let Some(merged) = &state.merged_result else {
        let _ = writeln!(out, "Query {} has no answer yet ({})", state.query_id, state.phase);
        return out;
    };

    let _ = writeln!(out, "{}", merged.answer_text);
    let _ = writeln!(out);
    let _ = writeln!(out, "Confidence: {}", merged.confidence.overall);
    if let Some(intent) = &state.intent {
        let _ = writeln!(out, "Intent: {} ({})", intent.intent_type, intent.confidence);
    }
    if merged.degraded {
        let missing: Vec<String> = merged.missing_sources.iter().map(|k| k.to_string()).collect();
        let _ = writeln!(out, "Partial answer, missing: {}", missing.join(", "));
    }

    if !merged.sources.is_empty() {
        let _ = writeln!(out, "\nSources:");
        for source in &merged.sources {
            match &source.url {
                Some(url) => {
                    let _ = writeln!(out, "  - {} <{}>", source.title, url);
                }
                None => {
                    let _ = writeln!(out, "  - {} [{}]", source.title, source.id);
                }
            }
        }
    }

    if !merged.reasoning_trace.is_empty() {
        let _ = writeln!(out, "\nReasoning:");
        for step in &merged.reasoning_trace {
            let _ = writeln!(out, "  {}. {}", step.step, step.description);
        }
    }

    if !merged.recommended_actions.is_empty() {
        let _ = writeln!(out, "\nRecommended actions:");
        for action in &merged.recommended_actions {
            let _ = writeln!(
                out,
                "  - [{:?}] {} ({})",
                action.tier, action.description, action.confidence
            );
        }
    }

    if let Some(forecast) = &merged.forecast {
        let _ = writeln!(
            out,
            "\nForecast: {} over {} = {} (p={})",
            forecast.metric, forecast.horizon, forecast.predicted_value, forecast.probability
        );
    }

    if let Some(metrics) = metrics {
        let _ = writeln!(
            out,
            "\nLatency: intent {}ms, sources {}ms, merge {}ms, total {}ms",
            metrics.intent_latency_ms,
            metrics.query_latency_ms,
            metrics.merge_latency_ms,
            metrics.total_latency_ms
        );
    }

    out
}
