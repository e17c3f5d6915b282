//! Merge engine
//!
//! Combines zero, one or two [`SourceResult`]s into a single [`MergedResult`].
//! The merge is a pure function of its inputs: the orchestrator calls it every
//! time a source settles to refresh the preview, and once more for the final
//! answer. Results are slotted by kind (graph, vector), so the order in which
//! sources arrive never changes the outcome.

use query_orchestrator_sdk::{
    ActionTier, ConfidenceBreakdown, Forecast, MergedResult, ReasoningStep, RecommendedAction, Score,
    SourceKind, SourceReference, SourceResult,
};

/// Merge a graph result and a vector result.
///
/// A result with `succeeded == false` counts as absent and is reported in
/// `missing_sources`.
pub fn merge(graph: Option<&SourceResult>, vector: Option<&SourceResult>) -> MergedResult {
    let graph = graph.filter(|r| r.succeeded);
    let vector = vector.filter(|r| r.succeeded);

    let mut missing_sources = Vec::new();
    if graph.is_none() {
        missing_sources.push(SourceKind::GraphMemory);
    }
    if vector.is_none() {
        missing_sources.push(SourceKind::VectorRetrieval);
    }

    match (graph, vector) {
        (None, None) => MergedResult {
            degraded: true,
            missing_sources,
            ..Default::default()
        },
        (Some(only), None) | (None, Some(only)) => MergedResult {
            answer_text: only.answer_text.clone(),
            confidence: only.confidence,
            sources: only.sources.clone(),
            reasoning_trace: only.reasoning_trace.clone(),
            recommended_actions: only.recommended_actions.clone(),
            forecast: only.forecast.clone(),
            degraded: true,
            missing_sources,
            contributing_sources: vec![only.source_kind],
        },
        (Some(graph), Some(vector)) => MergedResult {
            answer_text: merge_answer(&graph.answer_text, &vector.answer_text),
            confidence: merge_confidence(&graph.confidence, &vector.confidence),
            sources: dedup_sources(&graph.sources, &vector.sources),
            reasoning_trace: renumber_trace(&[graph, vector]),
            recommended_actions: merge_actions(
                &graph.recommended_actions,
                &vector.recommended_actions,
            ),
            forecast: pick_forecast(graph.forecast.as_ref(), vector.forecast.as_ref()),
            degraded: false,
            missing_sources,
            contributing_sources: vec![SourceKind::GraphMemory, SourceKind::VectorRetrieval],
        },
    }
}

/// Slot results by kind and merge them.
///
/// At most one result per kind is expected; a later result of the same kind
/// replaces an earlier one.
pub fn merge_results<I>(results: I) -> MergedResult
where
    I: IntoIterator<Item = SourceResult>,
{
    let mut graph = None;
    let mut vector = None;
    for result in results {
        match result.source_kind {
            SourceKind::GraphMemory => graph = Some(result),
            SourceKind::VectorRetrieval => vector = Some(result),
        }
    }
    merge(graph.as_ref(), vector.as_ref())
}

/// Graph narrative first, then every vector sentence not already covered
fn merge_answer(primary: &str, secondary: &str) -> String {
    let primary = primary.trim();
    if primary.is_empty() {
        return secondary.trim().to_string();
    }

    let mut merged = primary.to_string();
    let mut seen = normalize(&merged);
    for sentence in split_sentences(secondary) {
        let key = normalize(sentence);
        if key.is_empty() || seen.contains(&key) {
            continue;
        }
        merged.push(' ');
        merged.push_str(sentence);
        seen.push(' ');
        seen.push_str(&key);
    }
    merged
}

/// Split on `.`, `!` or `?` followed by whitespace or end of text
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let end = idx + ch.len_utf8();
        let at_break = text[end..].chars().next().map_or(true, char::is_whitespace);
        if at_break {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Lowercase, collapse whitespace, drop trailing sentence punctuation
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', '!', '?'])
        .to_string()
}

fn merge_confidence(a: &ConfidenceBreakdown, b: &ConfidenceBreakdown) -> ConfidenceBreakdown {
    ConfidenceBreakdown {
        overall: Score::mean(a.overall, b.overall),
        freshness: merge_slot(a.freshness, b.freshness),
        relationship_strength: merge_slot(a.relationship_strength, b.relationship_strength),
        source_reliability: merge_slot(a.source_reliability, b.source_reliability),
        historical_accuracy: merge_slot(a.historical_accuracy, b.historical_accuracy),
        entity_completeness: merge_slot(a.entity_completeness, b.entity_completeness),
    }
}

fn merge_slot(a: Option<Score>, b: Option<Score>) -> Option<Score> {
    match (a, b) {
        (Some(a), Some(b)) => Some(Score::mean(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Concatenate, keeping the first of any exactly-equal references
fn dedup_sources(first: &[SourceReference], second: &[SourceReference]) -> Vec<SourceReference> {
    let mut merged: Vec<SourceReference> = Vec::with_capacity(first.len() + second.len());
    for reference in first.iter().chain(second) {
        if !merged.contains(reference) {
            merged.push(reference.clone());
        }
    }
    merged
}

/// Concatenate traces in slot order and renumber 1..n, tagging each step's origin
fn renumber_trace(results: &[&SourceResult]) -> Vec<ReasoningStep> {
    results
        .iter()
        .flat_map(|result| {
            result.reasoning_trace.iter().map(|step| ReasoningStep {
                step: 0,
                description: step.description.clone(),
                origin: step.origin.or(Some(result.source_kind)),
            })
        })
        .enumerate()
        .map(|(idx, step)| ReasoningStep {
            step: idx as u32 + 1,
            ..step
        })
        .collect()
}

/// Concatenate graph then vector actions.
///
/// A `(action_type, tier)` key present in both sources keeps only the entries
/// of the side with the higher best confidence; ties keep the graph side.
/// Repeats within one source are left alone.
fn merge_actions(graph: &[RecommendedAction], vector: &[RecommendedAction]) -> Vec<RecommendedAction> {
    let graph_kept = graph
        .iter()
        .filter(|action| graph_wins(graph, vector, action.dedup_key()).unwrap_or(true));
    let vector_kept = vector
        .iter()
        .filter(|action| !graph_wins(graph, vector, action.dedup_key()).unwrap_or(false));
    graph_kept.chain(vector_kept).cloned().collect()
}

/// `None` when `key` is not shared by both sources
fn graph_wins(
    graph: &[RecommendedAction],
    vector: &[RecommendedAction],
    key: (&str, ActionTier),
) -> Option<bool> {
    Some(best_confidence(graph, key)? >= best_confidence(vector, key)?)
}

fn best_confidence(actions: &[RecommendedAction], key: (&str, ActionTier)) -> Option<Score> {
    actions
        .iter()
        .filter(|action| action.dedup_key() == key)
        .map(|action| action.confidence)
        .fold(None, |best, confidence| match best {
            Some(best) if best >= confidence => Some(best),
            _ => Some(confidence),
        })
}

/// Higher probability wins; ties keep the graph forecast
fn pick_forecast(graph: Option<&Forecast>, vector: Option<&Forecast>) -> Option<Forecast> {
    match (graph, vector) {
        (Some(g), Some(v)) if v.probability > g.probability => Some(v.clone()),
        (Some(g), _) => Some(g.clone()),
        (None, v) => v.cloned(),
    }
}
