//! Paginated walk over the review source.
//!
//! Pages are requested newest-first at `offset = 0, page_size, 2 * page_size, ...`
//! until the source runs dry, a page holds nothing newer than what the store
//! already has, or the offset ceiling is reached. Throttled pages are retried
//! with exponential backoff; anything else ends the walk with what was collected.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use review_api_client::{cancellable_sleep, retry_with_backoff, RawReview, ReviewApiError, RetryPolicy};
use reviewpulse_common::{Config, Entity};

use crate::traits::ReviewSource;

/// Pagination and pacing knobs for one walk.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub page_size: u32,
    /// Offsets at or beyond this value are never requested.
    pub max_offset: u32,
    /// Pause after every successfully fetched page.
    pub page_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_offset: 1000,
            page_delay: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

impl FetchConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.page_size,
            max_offset: config.max_offset,
            page_delay: config.page_delay,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                initial_delay: config.initial_retry_delay,
                ..RetryPolicy::default()
            },
        }
    }
}

/// What the store already knows about an entity before the walk starts.
#[derive(Debug, Clone, Default)]
pub struct KnownState {
    pub existing_ids: HashSet<String>,
    pub latest_entry: Option<DateTime<Utc>>,
}

/// Why a walk ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The source returned an empty page.
    Exhausted,
    /// Every review on the latest page was already covered by the store.
    CaughtUp,
    /// The next offset would reach the configured ceiling.
    OffsetCeiling,
    /// A page stayed throttled through every retry.
    RetriesExhausted,
    /// A non-retryable failure (bad status, network, unparseable body).
    Upstream(String),
    Cancelled,
}

impl StopReason {
    /// Whether the walk ended because of a failure rather than a normal stop.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::RetriesExhausted | Self::Upstream(_))
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => f.write_str("source exhausted"),
            Self::CaughtUp => f.write_str("caught up with stored reviews"),
            Self::OffsetCeiling => f.write_str("offset ceiling reached"),
            Self::RetriesExhausted => f.write_str("rate limited after all retries"),
            Self::Upstream(msg) => write!(f, "upstream failure: {msg}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of a walk. `reviews` holds only items not already known, in the
/// order the source returned them.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub reviews: Vec<RawReview>,
    /// Total reported by the first successful page.
    pub reported_total: Option<i64>,
    pub pages_fetched: u32,
    pub stop: StopReason,
}

/// Walk the source for `entity`, collecting reviews that are neither in
/// `known.existing_ids` nor repeated within the walk.
pub async fn fetch_all(
    source: &dyn ReviewSource,
    entity: &Entity,
    known: &KnownState,
    config: &FetchConfig,
    cancel: &CancellationToken,
) -> FetchOutcome {
    let mut reviews = Vec::new();
    let mut walk_ids: HashSet<String> = HashSet::new();
    let mut reported_total = None;
    let mut pages_fetched = 0;
    let mut offset = 0u32;
    let label = entity.name.as_str();

    let stop = loop {
        if offset >= config.max_offset {
            info!(entity = label, offset, "Reached offset ceiling");
            break StopReason::OffsetCeiling;
        }

        let result = retry_with_backoff(&config.retry, cancel, label, || {
            source.fetch_page(entity, offset, config.page_size)
        })
        .await;

        let page = match result {
            Ok(page) => page,
            Err(ReviewApiError::Cancelled) => break StopReason::Cancelled,
            Err(ReviewApiError::RateLimited) => {
                warn!(entity = label, offset, "Still rate limited after all retries, stopping");
                break StopReason::RetriesExhausted;
            }
            Err(e) => {
                warn!(entity = label, offset, error = %e, "Page fetch failed, stopping");
                break StopReason::Upstream(e.to_string());
            }
        };

        pages_fetched += 1;
        if pages_fetched == 1 {
            reported_total = page.total;
        }

        if page.items.is_empty() {
            info!(entity = label, offset, "No more reviews available");
            break StopReason::Exhausted;
        }

        if let Some(latest) = known.latest_entry {
            let all_known = page
                .items
                .iter()
                .all(|r| r.entry_time().is_some_and(|t| t <= latest));
            if all_known {
                info!(entity = label, offset, %latest, "Page holds no entries newer than the store");
                break StopReason::CaughtUp;
            }
        }

        let page_len = page.items.len();
        let mut new_on_page = 0;
        for item in page.items {
            let is_new = match item.canonical_id() {
                Some(id) => !known.existing_ids.contains(&id) && walk_ids.insert(id),
                // Kept so validation can count it.
                None => true,
            };
            if is_new {
                new_on_page += 1;
                reviews.push(item);
            }
        }

        info!(
            entity = label,
            offset,
            fetched = page_len,
            new = new_on_page,
            collected = reviews.len(),
            "Fetched review page"
        );

        offset = offset.saturating_add(config.page_size);

        if !cancellable_sleep(cancel, config.page_delay).await {
            break StopReason::Cancelled;
        }
    };

    FetchOutcome {
        reviews,
        reported_total,
        pages_fetched,
        stop,
    }
}
