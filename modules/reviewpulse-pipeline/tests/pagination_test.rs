//! Paginated walk over a scripted review source.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use reviewpulse_pipeline::fetch::{fetch_all, FetchConfig, KnownState, StopReason};
use reviewpulse_pipeline::testing::{days_ago, entity, fast_fetch_config, raw_review, MockReviewSource};

fn ids(outcome: &reviewpulse_pipeline::FetchOutcome) -> Vec<String> {
    outcome
        .reviews
        .iter()
        .filter_map(|r| r.canonical_id())
        .collect()
}

#[tokio::test]
async fn walk_stops_on_first_empty_page() {
    let source = MockReviewSource::new(4)
        .on_page(0, vec![raw_review("a", days_ago(1)), raw_review("b", days_ago(2))])
        .on_page(2, vec![raw_review("c", days_ago(3)), raw_review("d", days_ago(4))]);

    let outcome = fetch_all(
        &source,
        &entity("Jagdhof"),
        &KnownState::default(),
        &fast_fetch_config(2),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(source.requests(), vec![0, 2, 4], "three pages, the third empty");
    assert_eq!(outcome.stop, StopReason::Exhausted);
    assert_eq!(outcome.pages_fetched, 3);
    assert_eq!(ids(&outcome), vec!["a", "b", "c", "d"]);
    assert_eq!(outcome.reported_total, Some(4));
}

#[tokio::test]
async fn walk_stops_when_a_page_holds_nothing_newer() {
    let source = MockReviewSource::new(6)
        .on_page(0, vec![raw_review("new-1", days_ago(1)), raw_review("new-2", days_ago(2))])
        .on_page(2, vec![raw_review("old-1", days_ago(6)), raw_review("old-2", days_ago(7))])
        .on_page(4, vec![raw_review("old-3", days_ago(8))]);
    let known = KnownState {
        existing_ids: HashSet::new(),
        latest_entry: Some(days_ago(5)),
    };

    let outcome = fetch_all(
        &source,
        &entity("Jagdhof"),
        &known,
        &fast_fetch_config(2),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(source.requests(), vec![0, 2]);
    assert_eq!(outcome.stop, StopReason::CaughtUp);
    assert_eq!(ids(&outcome), vec!["new-1", "new-2"], "the caught-up page is not collected");
}

#[tokio::test]
async fn mixed_page_does_not_stop_the_walk() {
    // One old entry among new ones keeps the walk going.
    let source = MockReviewSource::new(3)
        .on_page(0, vec![raw_review("new", days_ago(1)), raw_review("old", days_ago(9))])
        .on_page(2, vec![raw_review("newer", days_ago(2))]);
    let known = KnownState {
        existing_ids: HashSet::new(),
        latest_entry: Some(days_ago(5)),
    };

    let outcome = fetch_all(
        &source,
        &entity("Jagdhof"),
        &known,
        &fast_fetch_config(2),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(source.requests(), vec![0, 2, 4]);
    assert_eq!(outcome.stop, StopReason::Exhausted);
}

#[tokio::test]
async fn known_ids_are_skipped_without_stopping() {
    let source = MockReviewSource::new(4).on_page(
        0,
        vec![
            raw_review("5", days_ago(1)),
            raw_review("6", days_ago(2)),
            raw_review("7", days_ago(3)),
            raw_review("8", days_ago(4)),
        ],
    );
    let known = KnownState {
        existing_ids: ["5", "7"].iter().map(|s| s.to_string()).collect(),
        latest_entry: None,
    };

    let outcome = fetch_all(
        &source,
        &entity("Jagdhof"),
        &known,
        &fast_fetch_config(4),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(ids(&outcome), vec!["6", "8"]);
    assert_eq!(source.requests(), vec![0, 4]);
}

#[tokio::test]
async fn offset_ceiling_bounds_the_walk() {
    let source = MockReviewSource::new(100)
        .on_page(0, vec![raw_review("a", days_ago(1)), raw_review("b", days_ago(1))])
        .on_page(2, vec![raw_review("c", days_ago(2)), raw_review("d", days_ago(2))])
        .on_page(4, vec![raw_review("e", days_ago(3)), raw_review("f", days_ago(3))]);
    let mut config = fast_fetch_config(2);
    config.max_offset = 4;

    let outcome = fetch_all(
        &source,
        &entity("Jagdhof"),
        &KnownState::default(),
        &config,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(source.requests(), vec![0, 2]);
    assert_eq!(outcome.stop, StopReason::OffsetCeiling);
    assert_eq!(ids(&outcome), vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn throttled_page_is_retried_at_the_same_offset() {
    let source = MockReviewSource::new(1)
        .rate_limited(0, 2)
        .on_page(0, vec![raw_review("a", days_ago(1))]);

    let outcome = fetch_all(
        &source,
        &entity("Jagdhof"),
        &KnownState::default(),
        &fast_fetch_config(1),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(source.requests(), vec![0, 0, 0, 1]);
    assert_eq!(outcome.stop, StopReason::Exhausted);
    assert_eq!(ids(&outcome), vec!["a"]);
}

#[tokio::test]
async fn exhausted_retries_keep_partial_results() {
    let source = MockReviewSource::new(10)
        .on_page(0, vec![raw_review("a", days_ago(1)), raw_review("b", days_ago(1))])
        .rate_limited(2, 1);

    let outcome = fetch_all(
        &source,
        &entity("Jagdhof"),
        &KnownState::default(),
        &fast_fetch_config(2),
        &CancellationToken::new(),
    )
    .await;

    // One attempt plus three retries at offset 2.
    assert_eq!(source.requests(), vec![0, 2, 2, 2, 2]);
    assert_eq!(outcome.stop, StopReason::RetriesExhausted);
    assert_eq!(ids(&outcome), vec!["a", "b"]);
}

#[tokio::test]
async fn upstream_error_aborts_the_walk_without_retry() {
    let source = MockReviewSource::new(10).on_status(0, 500);

    let outcome = fetch_all(
        &source,
        &entity("Jagdhof"),
        &KnownState::default(),
        &fast_fetch_config(2),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(source.requests(), vec![0]);
    assert!(matches!(outcome.stop, StopReason::Upstream(_)));
    assert!(outcome.reviews.is_empty());
    assert_eq!(outcome.reported_total, None);
}

#[tokio::test]
async fn ids_repeated_across_pages_are_collected_once() {
    let source = MockReviewSource::new(4)
        .on_page(0, vec![raw_review("a", days_ago(1)), raw_review("b", days_ago(2))])
        .on_page(2, vec![raw_review("b", days_ago(2)), raw_review("c", days_ago(3))]);

    let outcome = fetch_all(
        &source,
        &entity("Jagdhof"),
        &KnownState::default(),
        &fast_fetch_config(2),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(ids(&outcome), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn cancelled_walk_makes_no_requests() {
    let source = MockReviewSource::new(1).on_page(0, vec![raw_review("a", days_ago(1))]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = fetch_all(
        &source,
        &entity("Jagdhof"),
        &KnownState::default(),
        &fast_fetch_config(2),
        &cancel,
    )
    .await;

    assert!(source.requests().is_empty());
    assert_eq!(outcome.stop, StopReason::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn each_non_empty_page_is_followed_by_the_page_delay() {
    let source = MockReviewSource::new(4)
        .on_page(0, vec![raw_review("a", days_ago(1)), raw_review("b", days_ago(2))])
        .on_page(2, vec![raw_review("c", days_ago(3)), raw_review("d", days_ago(4))]);
    let config = FetchConfig {
        page_delay: Duration::from_secs(1),
        ..fast_fetch_config(2)
    };

    let started = Instant::now();
    let outcome = fetch_all(
        &source,
        &entity("Jagdhof"),
        &KnownState::default(),
        &config,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.pages_fetched, 3);
    assert_eq!(outcome.stop, StopReason::Exhausted);
    assert_eq!(started.elapsed(), Duration::from_secs(2), "the empty page ends the walk without a pause");
}
