use anyhow::{bail, Result};
use clap::Parser;
use query_orchestrator::cli::{render_answer, Args, Command};
use query_orchestrator::{Orchestrator, OrchestratorConfig};
use query_orchestrator_sdk::{
    log_info, log_phase_console, log_source_console, log_warning, Phase, QueryContext,
    QueryRuntime, RunState, SourceKind,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = OrchestratorConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Config => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
        Command::Ask {
            question,
            context,
            json,
        } => ask(config, question.join(" "), context.into_iter().collect(), json).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("query_orchestrator=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn ask(config: OrchestratorConfig, question: String, context: QueryContext, json: bool) -> Result<()> {
    let orchestrator = Orchestrator::with_http_backends(config)?;
    let printer = (!json).then(|| tokio::spawn(print_progress(orchestrator.subscribe())));

    let handle = orchestrator.submit(&question, context).await?;
    if !json {
        log_info!("Submitted query {}", handle.query_id());
    }

    let terminal = tokio::select! {
        state = handle.wait() => state?,
        _ = tokio::signal::ctrl_c() => {
            orchestrator.cancel();
            log_warning!("Interrupted, query cancelled");
            return Ok(());
        }
    };
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let metrics = orchestrator.metrics();
    if json {
        let report = serde_json::json!({ "run": terminal, "metrics": metrics });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        print!("{}", render_answer(&terminal, metrics.as_ref()));
    }

    match (&terminal.phase, &terminal.error) {
        (Phase::Error, Some(error)) => bail!("{}: {}", error.kind, error.message),
        _ => Ok(()),
    }
}

/// Print phase changes and settled sources as they stream in
async fn print_progress(mut updates: broadcast::Receiver<RunState>) {
    let mut phase = Phase::Idle;
    let mut reported: Vec<SourceKind> = Vec::new();

    loop {
        let state = match updates.recv().await {
            Ok(state) => state,
            Err(RecvError::Lagged(skipped)) => {
                log_warning!("Progress display skipped {} updates", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        if state.phase != phase {
            phase = state.phase;
            log_phase_console!(state.query_id, phase);
        }

        for kind in SourceKind::ALL {
            if reported.contains(&kind) {
                continue;
            }
            if let Some(result) = state.source(kind) {
                reported.push(kind);
                let detail = if result.succeeded {
                    format!("confidence {}", result.confidence.overall)
                } else {
                    result.error.clone().unwrap_or_default()
                };
                log_source_console!(kind, result.succeeded, detail);
            }
        }

        if state.is_terminal() {
            break;
        }
    }
}
