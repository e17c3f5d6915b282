//! Property tests for the merge engine

use proptest::prelude::*;
use query_orchestrator::{merge, merge_results};
use query_orchestrator_sdk::{
    ActionTier, ConfidenceBreakdown, Forecast, ReasoningStep, RecommendedAction, Score,
    SourceKind, SourceReference, SourceResult,
};
use std::collections::HashSet;

// ============================================================================
// Strategies
// ============================================================================

fn noisy_score() -> impl Strategy<Value = f64> {
    prop_oneof![0.0..=1.0f64, -2.0..3.0f64]
}

fn breakdown() -> impl Strategy<Value = ConfidenceBreakdown> {
    (
        noisy_score(),
        proptest::option::of(noisy_score()),
        proptest::option::of(noisy_score()),
        proptest::option::of(noisy_score()),
    )
        .prop_map(|(overall, freshness, relationship, reliability)| {
            let mut breakdown = ConfidenceBreakdown::new(overall);
            breakdown.freshness = freshness.map(Score::new);
            breakdown.relationship_strength = relationship.map(Score::new);
            breakdown.source_reliability = reliability.map(Score::new);
            breakdown
        })
}

fn action() -> impl Strategy<Value = RecommendedAction> {
    (
        prop::sample::select(vec!["reprice", "escalate", "hire"]),
        prop::sample::select(vec![
            ActionTier::Immediate,
            ActionTier::ShortTerm,
            ActionTier::LongTerm,
        ]),
        noisy_score(),
    )
        .prop_map(|(kind, tier, confidence)| {
            RecommendedAction::new(kind, tier, format!("{kind} ({tier:?})"), confidence)
        })
}

fn reference() -> impl Strategy<Value = SourceReference> {
    prop::sample::select(vec!["acct-1", "acct-2", "doc-7", "doc-9"])
        .prop_map(|id| SourceReference::new(id, format!("record {id}")))
}

fn forecast() -> impl Strategy<Value = Forecast> {
    (-1.0e6..1.0e6f64, noisy_score()).prop_map(|(value, probability)| Forecast {
        metric: "arr".to_string(),
        horizon: "Q2".to_string(),
        predicted_value: value,
        probability: Score::new(probability),
    })
}

prop_compose! {
    fn source_result(kind: SourceKind)(
        succeeded in prop::bool::weighted(0.8),
        answer in prop::sample::select(vec![
            "Renewals slipped.",
            "Renewals slipped. Coverage is thin.",
            "Coverage is thin! Hiring lags?",
            "",
        ]),
        confidence in breakdown(),
        sources in prop::collection::vec(reference(), 0..4),
        steps in prop::collection::vec("[a-z ]{1,12}", 0..4),
        actions in prop::collection::vec(action(), 0..4),
        forecast in proptest::option::of(forecast()),
    ) -> SourceResult {
        if !succeeded {
            return SourceResult::failed(kind, "backend unavailable");
        }
        let trace = steps
            .into_iter()
            .enumerate()
            .map(|(idx, step)| ReasoningStep::new(idx as u32 + 1, step))
            .collect();
        let mut result = SourceResult::success(kind, answer, confidence)
            .with_sources(sources)
            .with_trace(trace)
            .with_actions(actions);
        result.forecast = forecast;
        result
    }
}

fn count_key(actions: &[RecommendedAction], key: (&str, ActionTier)) -> usize {
    actions.iter().filter(|a| a.dedup_key() == key).count()
}

fn in_unit_range(score: Score) -> bool {
    (0.0..=1.0).contains(&score.value())
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_merge_is_order_independent(
        graph in source_result(SourceKind::GraphMemory),
        vector in source_result(SourceKind::VectorRetrieval),
    ) {
        let forward = merge_results(vec![graph.clone(), vector.clone()]);
        let backward = merge_results(vec![vector, graph]);
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn prop_merged_scores_stay_in_unit_range(
        graph in source_result(SourceKind::GraphMemory),
        vector in source_result(SourceKind::VectorRetrieval),
    ) {
        let merged = merge(Some(&graph), Some(&vector));
        prop_assert!(merged.confidence.components().into_iter().all(in_unit_range));
        prop_assert!(merged.recommended_actions.iter().all(|a| in_unit_range(a.confidence)));
        if let Some(forecast) = &merged.forecast {
            prop_assert!(in_unit_range(forecast.probability));
        }
    }

    #[test]
    fn prop_overall_is_mean_when_both_succeed(
        graph in source_result(SourceKind::GraphMemory),
        vector in source_result(SourceKind::VectorRetrieval),
    ) {
        prop_assume!(graph.succeeded && vector.succeeded);
        let merged = merge(Some(&graph), Some(&vector));
        let expected = (graph.confidence.overall.value() + vector.confidence.overall.value()) / 2.0;
        prop_assert!((merged.confidence.overall.value() - expected).abs() < 1e-12);
        prop_assert!(!merged.degraded);
    }

    #[test]
    fn prop_degraded_iff_a_source_is_missing(
        graph in source_result(SourceKind::GraphMemory),
        vector in source_result(SourceKind::VectorRetrieval),
    ) {
        let merged = merge(Some(&graph), Some(&vector));
        let contributing = [&graph, &vector].iter().filter(|r| r.succeeded).count();
        prop_assert_eq!(merged.degraded, contributing < 2);
        prop_assert_eq!(merged.contributing_sources.len(), contributing);
        prop_assert_eq!(merged.missing_sources.len(), 2 - contributing);
    }

    #[test]
    fn prop_each_action_key_comes_from_one_side(
        graph in source_result(SourceKind::GraphMemory),
        vector in source_result(SourceKind::VectorRetrieval),
    ) {
        let merged = merge(Some(&graph), Some(&vector));
        let contributing: Vec<&[RecommendedAction]> = [&graph, &vector]
            .into_iter()
            .filter(|r| r.succeeded)
            .map(|r| r.recommended_actions.as_slice())
            .collect();

        let keys: HashSet<_> = contributing
            .iter()
            .flat_map(|actions| actions.iter().map(|a| a.dedup_key()))
            .collect();
        for key in keys {
            let kept = count_key(&merged.recommended_actions, key);
            prop_assert!(kept > 0);
            prop_assert!(contributing.iter().any(|actions| count_key(actions, key) == kept));
        }
    }

    #[test]
    fn prop_trace_numbered_from_one(
        graph in source_result(SourceKind::GraphMemory),
        vector in source_result(SourceKind::VectorRetrieval),
    ) {
        let merged = merge(Some(&graph), Some(&vector));

        let numbers: Vec<u32> = merged.reasoning_trace.iter().map(|s| s.step).collect();
        let expected: Vec<u32> = (1..=merged.reasoning_trace.len() as u32).collect();
        prop_assert_eq!(numbers, expected);
    }

    #[test]
    fn prop_score_always_clamped(value in proptest::num::f64::ANY) {
        prop_assert!(in_unit_range(Score::new(value)));
    }
}

#[test]
fn test_noisy_component_clamped_through_merge() {
    let graph = SourceResult::success(
        SourceKind::GraphMemory,
        "Renewals slipped.",
        ConfidenceBreakdown::new(1.4).with_relationship_strength(1.4),
    );
    let merged = merge(Some(&graph), None);
    assert_eq!(merged.confidence.overall, Score::ONE);
    assert_eq!(merged.confidence.relationship_strength, Some(Score::ONE));
}
