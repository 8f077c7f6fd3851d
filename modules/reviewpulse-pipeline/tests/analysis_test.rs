//! Analysis run coordinator against the in-memory store and a mock engine.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use reviewpulse_common::{Entity, Review, ReviewPulseError, RunKind};
use reviewpulse_pipeline::testing::{
    analysis_config, days_ago, entity, fast_summarize_config, review, summary_json, MockReviewStore,
    MockSummaryEngine,
};
use reviewpulse_pipeline::{AnalysisCoordinator, BatchSummarizer, RunOutcome};

fn coordinator(store: &Arc<MockReviewStore>, engine: &Arc<MockSummaryEngine>) -> AnalysisCoordinator {
    AnalysisCoordinator::new(
        store.clone(),
        BatchSummarizer::new(engine.clone(), fast_summarize_config()),
        analysis_config(),
    )
}

/// Reviews "r0".."r{n-1}", where "r{i}" was entered `i` days ago.
fn daily_reviews(n: usize) -> Vec<Review> {
    (0..n).map(|i| review(&format!("r{i}"), days_ago(i as i64))).collect()
}

fn store_with(hotel: &Entity, reviews: Vec<Review>) -> MockReviewStore {
    MockReviewStore::new().with_reviews(hotel, reviews).with_total(hotel, 250)
}

#[tokio::test]
async fn count_run_takes_the_newest_and_marks_them() {
    let hotel = entity("Jagdhof");
    let store = Arc::new(store_with(&hotel, daily_reviews(12)));
    let engine = Arc::new(MockSummaryEngine::new().always(summary_json("gut", &["Lage"])));

    let outcome = coordinator(&store, &engine)
        .run_by_count(&hotel, 5, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Completed { analyzed_reviews: 5, total_reviews: 250, .. }));

    let analyses = store.analyses(&hotel);
    assert_eq!(analyses.len(), 1);
    assert_eq!(analyses[0].window_days, 0);
    assert_eq!(analyses[0].analyzed_reviews, 5);
    assert_eq!(analyses[0].total_reviews, 250);
    assert_eq!(store.analyzed_ids(), vec!["r0", "r1", "r2", "r3", "r4"]);
}

#[tokio::test]
async fn window_run_only_includes_recent_unanalyzed_reviews() {
    let hotel = entity("Jagdhof");
    let store = Arc::new(store_with(&hotel, daily_reviews(20)).with_analyzed(&["r1", "r2"]));
    let engine = Arc::new(MockSummaryEngine::new().always(summary_json("gut", &[])));

    coordinator(&store, &engine)
        .run_by_window(&hotel, 7, &CancellationToken::new())
        .await
        .unwrap();

    // r0..=r7 fall inside the window; r1 and r2 were analyzed before.
    let analyses = store.analyses(&hotel);
    assert_eq!(analyses[0].analyzed_reviews, 6);
    assert_eq!(analyses[0].window_days, 7);

    let mut marked = store.analyzed_ids();
    marked.sort();
    assert_eq!(marked, vec!["r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7"]);
}

#[tokio::test]
async fn window_run_is_capped() {
    let hotel = entity("Jagdhof");
    let recent: Vec<Review> = (0..60).map(|i| review(&format!("n{i}"), days_ago(0))).collect();
    let store = Arc::new(store_with(&hotel, recent));
    let engine = Arc::new(MockSummaryEngine::new().always(summary_json("gut", &[])));

    coordinator(&store, &engine)
        .run_by_window(&hotel, 7, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(store.analyses(&hotel)[0].analyzed_reviews, 50);
    assert_eq!(store.analyzed_ids().len(), 50);
    assert_eq!(engine.calls(), 5);
}

#[tokio::test]
async fn merged_lists_are_stored_as_bullets() {
    let hotel = entity("Jagdhof");
    let store = Arc::new(store_with(&hotel, daily_reviews(15)));
    let engine = Arc::new(
        MockSummaryEngine::new()
            .respond(summary_json("positiv", &["Lage", "Frühstück"]))
            .respond(summary_json("sehr positiv", &["Frühstück", "Spa"])),
    );

    coordinator(&store, &engine)
        .run_by_count(&hotel, 30, &CancellationToken::new())
        .await
        .unwrap();

    let record = &store.analyses(&hotel)[0];
    assert_eq!(record.overall_sentiment, "sehr positiv");
    assert_eq!(record.positive_points, "• Lage\n• Frühstück\n• Spa");
    assert_eq!(record.negative_points, "");
    assert_eq!(record.analyzed_reviews, 15);
}

#[tokio::test]
async fn missing_total_count_fails_before_summarizing() {
    let hotel = entity("Jagdhof");
    let store = Arc::new(MockReviewStore::new().with_reviews(&hotel, daily_reviews(3)));
    let engine = Arc::new(MockSummaryEngine::new().always(summary_json("gut", &[])));

    let err = coordinator(&store, &engine)
        .run_by_count(&hotel, 30, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReviewPulseError::MissingTotalCount { .. }));
    assert_eq!(engine.calls(), 0);
    assert!(store.analyses(&hotel).is_empty());
}

#[tokio::test]
async fn out_of_range_day_window_is_rejected_before_selecting() {
    let hotel = entity("Jagdhof");
    let store = Arc::new(store_with(&hotel, daily_reviews(3)));
    let engine = Arc::new(MockSummaryEngine::new().always(summary_json("gut", &[])));

    let err = coordinator(&store, &engine)
        .run_by_window(&hotel, u32::MAX, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReviewPulseError::Config(_)));
    assert_eq!(engine.calls(), 0);
    assert!(store.analyses(&hotel).is_empty());
    assert!(store.analyzed_ids().is_empty());
    assert!(!store.lease_held(&hotel, RunKind::Analyze));
}

#[tokio::test]
async fn huge_count_analyzes_what_exists() {
    let hotel = entity("Jagdhof");
    let store = Arc::new(store_with(&hotel, daily_reviews(3)));
    let engine = Arc::new(MockSummaryEngine::new().always(summary_json("gut", &[])));

    let outcome = coordinator(&store, &engine)
        .run_by_count(&hotel, u32::MAX, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Completed { analyzed_reviews: 3, .. }));
    assert_eq!(store.analyses(&hotel)[0].window_days, 0);
    assert_eq!(store.analyses(&hotel)[0].analyzed_reviews, 3);
}

#[tokio::test]
async fn latest_total_marker_is_authoritative() {
    let hotel = entity("Jagdhof");
    let store = Arc::new(
        store_with(&hotel, daily_reviews(2))
            .with_total(&hotel, 240)
            .with_total(&hotel, 245),
    );
    let engine = Arc::new(MockSummaryEngine::new().always(summary_json("gut", &[])));

    coordinator(&store, &engine)
        .run_by_count(&hotel, 30, &CancellationToken::new())
        .await
        .unwrap();

    // Totals may move backwards; the newest marker still wins.
    assert_eq!(store.analyses(&hotel)[0].total_reviews, 245);
}

#[tokio::test]
async fn empty_candidate_set_is_a_successful_no_op() {
    let hotel = entity("Jagdhof");
    let store = Arc::new(store_with(&hotel, daily_reviews(2)).with_analyzed(&["r0", "r1"]));
    let engine = Arc::new(MockSummaryEngine::new());

    let outcome = coordinator(&store, &engine)
        .run_by_count(&hotel, 30, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, RunOutcome::NothingToAnalyze);
    assert!(store.analyses(&hotel).is_empty());
    assert_eq!(store.provision_calls(), 1);
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn analyzed_markers_are_shared_across_entities() {
    let first = entity("Jagdhof");
    let second = entity("Seehof");
    let store = Arc::new(
        store_with(&first, vec![review("shared", days_ago(1))])
            .with_reviews(&second, vec![review("shared", days_ago(1)), review("own", days_ago(2))])
            .with_total(&second, 10),
    );
    let engine = Arc::new(MockSummaryEngine::new().always(summary_json("gut", &[])));
    let coordinator = coordinator(&store, &engine);
    let cancel = CancellationToken::new();

    coordinator.run_by_count(&first, 30, &cancel).await.unwrap();
    coordinator.run_by_count(&second, 30, &cancel).await.unwrap();

    assert_eq!(store.analyses(&second)[0].analyzed_reviews, 1);
}

#[tokio::test]
async fn engine_failure_writes_no_markers() {
    let hotel = entity("Jagdhof");
    let store = Arc::new(store_with(&hotel, daily_reviews(5)));
    let engine = Arc::new(MockSummaryEngine::new().fail("HTTP 500"));

    let err = coordinator(&store, &engine)
        .run_by_count(&hotel, 30, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReviewPulseError::Upstream(_)));
    assert!(store.analyzed_ids().is_empty());
    assert!(store.analyses(&hotel).is_empty());
    assert!(!store.lease_held(&hotel, RunKind::Analyze));
}

#[tokio::test]
async fn record_write_failure_propagates() {
    let hotel = entity("Jagdhof");
    let store = Arc::new(store_with(&hotel, daily_reviews(3)).failing_record());
    let engine = Arc::new(MockSummaryEngine::new().always(summary_json("gut", &[])));

    let err = coordinator(&store, &engine)
        .run_by_count(&hotel, 30, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReviewPulseError::StoreWrite(_)));
    assert!(store.analyzed_ids().is_empty());
}

#[tokio::test]
async fn held_lease_blocks_a_second_run() {
    let hotel = entity("Jagdhof");
    let store = Arc::new(store_with(&hotel, daily_reviews(3)).with_held_lease(&hotel, RunKind::Analyze));
    let engine = Arc::new(MockSummaryEngine::new().always(summary_json("gut", &[])));

    let err = coordinator(&store, &engine)
        .run_by_count(&hotel, 30, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReviewPulseError::LeaseConflict { .. }));
    assert_eq!(engine.calls(), 0);
}

#[tokio::test]
async fn cancelled_run_writes_nothing() {
    let hotel = entity("Jagdhof");
    let store = Arc::new(store_with(&hotel, daily_reviews(3)));
    let engine = Arc::new(MockSummaryEngine::new().always(summary_json("gut", &[])));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = coordinator(&store, &engine)
        .run_by_count(&hotel, 30, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ReviewPulseError::Cancelled));
    assert!(store.analyses(&hotel).is_empty());
    assert!(store.analyzed_ids().is_empty());
}
