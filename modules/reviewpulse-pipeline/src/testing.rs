// Test mocks for the review pipeline.
//
// Three mocks matching the three trait boundaries:
// - MockReviewSource (ReviewSource): scripted responses per offset, records requests
// - MockReviewStore (ReviewStore): stateful in-memory store with failure switches
// - MockSummaryEngine (SummaryEngine): queued responses, records requests
//
// Plus helpers for building entities, raw reviews and stored reviews.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use review_api_client::{RawReview, RetryPolicy, ReviewApiError, ReviewPage};
use reviewpulse_common::{
    AnalysisRecord, AnalyzedMarker, Entity, Review, ReviewPulseError, RunKind, TotalCountMarker,
};

use crate::analysis::AnalysisConfig;
use crate::fetch::FetchConfig;
use crate::summarizer::SummarizeConfig;
use crate::traits::{ReviewSource, ReviewStore, StoreResult, SummaryEngine, SummaryRequest};

// ---------------------------------------------------------------------------
// MockReviewSource
// ---------------------------------------------------------------------------

/// One scripted reply of the review source.
#[derive(Debug, Clone)]
pub enum SourceReply {
    Page(Vec<RawReview>),
    RateLimited,
    Status(u16),
}

/// Offset-keyed review source. Each offset holds a queue of replies; the last
/// reply repeats once the queue is down to one. Unregistered offsets return an
/// empty page. Every page reports the same `total`.
pub struct MockReviewSource {
    replies: Mutex<HashMap<u32, VecDeque<SourceReply>>>,
    total: Option<i64>,
    requests: Mutex<Vec<u32>>,
}

impl MockReviewSource {
    pub fn new(total: i64) -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            total: Some(total),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Pages omit the `total` field.
    pub fn without_total(mut self) -> Self {
        self.total = None;
        self
    }

    fn push(self, offset: u32, reply: SourceReply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(offset)
            .or_default()
            .push_back(reply);
        self
    }

    pub fn on_page(self, offset: u32, items: Vec<RawReview>) -> Self {
        self.push(offset, SourceReply::Page(items))
    }

    /// Queue `times` throttled replies at `offset`.
    pub fn rate_limited(mut self, offset: u32, times: usize) -> Self {
        for _ in 0..times {
            self = self.push(offset, SourceReply::RateLimited);
        }
        self
    }

    pub fn on_status(self, offset: u32, status: u16) -> Self {
        self.push(offset, SourceReply::Status(status))
    }

    /// Offsets requested so far, in order, including retries.
    pub fn requests(&self) -> Vec<u32> {
        self.requests.lock().unwrap().clone()
    }

    fn next_reply(&self, offset: u32) -> SourceReply {
        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(&offset) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(SourceReply::Page(Vec::new())),
            Some(queue) => queue.front().cloned().unwrap_or(SourceReply::Page(Vec::new())),
            None => SourceReply::Page(Vec::new()),
        }
    }
}

#[async_trait]
impl ReviewSource for MockReviewSource {
    async fn fetch_page(
        &self,
        _entity: &Entity,
        offset: u32,
        _page_size: u32,
    ) -> std::result::Result<ReviewPage, ReviewApiError> {
        self.requests.lock().unwrap().push(offset);
        match self.next_reply(offset) {
            SourceReply::Page(items) => Ok(ReviewPage {
                items,
                total: self.total,
            }),
            SourceReply::RateLimited => Err(ReviewApiError::RateLimited),
            SourceReply::Status(status) => Err(ReviewApiError::Api {
                status,
                message: format!("mock status {status}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MockReviewStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    /// table_id → reviews
    reviews: HashMap<String, Vec<Review>>,
    /// entity_id → markers, in append order
    totals: HashMap<String, Vec<TotalCountMarker>>,
    analyzed: Vec<AnalyzedMarker>,
    /// table_id → run records
    analyses: HashMap<String, Vec<AnalysisRecord>>,
    leases: HashSet<(String, RunKind)>,
    insert_calls: usize,
    provision_calls: usize,
}

/// Stateful in-memory store. Failure switches simulate store outages.
#[derive(Default)]
pub struct MockReviewStore {
    state: Mutex<StoreState>,
    fail_existing_ids: bool,
    fail_latest_entry: bool,
    fail_inserts: bool,
    fail_totals: bool,
    fail_record: bool,
}

impl MockReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reviews(self, entity: &Entity, reviews: Vec<Review>) -> Self {
        self.state
            .lock()
            .unwrap()
            .reviews
            .entry(entity.table_id.clone())
            .or_default()
            .extend(reviews);
        self
    }

    pub fn with_total(self, entity: &Entity, total: i64) -> Self {
        self.state
            .lock()
            .unwrap()
            .totals
            .entry(entity.id.clone())
            .or_default()
            .push(TotalCountMarker {
                entity_id: entity.id.clone(),
                total_count: total,
                observed_at: Utc::now(),
            });
        self
    }

    pub fn with_analyzed(self, review_ids: &[&str]) -> Self {
        let now = Utc::now();
        self.state
            .lock()
            .unwrap()
            .analyzed
            .extend(review_ids.iter().map(|id| AnalyzedMarker {
                review_id: id.to_string(),
                analyzed_at: now,
            }));
        self
    }

    pub fn with_held_lease(self, entity: &Entity, kind: RunKind) -> Self {
        self.state
            .lock()
            .unwrap()
            .leases
            .insert((entity.id.clone(), kind));
        self
    }

    pub fn failing_existing_ids(mut self) -> Self {
        self.fail_existing_ids = true;
        self
    }

    pub fn failing_latest_entry(mut self) -> Self {
        self.fail_latest_entry = true;
        self
    }

    pub fn failing_inserts(mut self) -> Self {
        self.fail_inserts = true;
        self
    }

    pub fn failing_totals(mut self) -> Self {
        self.fail_totals = true;
        self
    }

    pub fn failing_record(mut self) -> Self {
        self.fail_record = true;
        self
    }

    // --- Inspection ---

    pub fn reviews(&self, entity: &Entity) -> Vec<Review> {
        self.state
            .lock()
            .unwrap()
            .reviews
            .get(&entity.table_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn review_ids(&self, entity: &Entity) -> Vec<String> {
        self.reviews(entity).into_iter().map(|r| r.review_id).collect()
    }

    pub fn totals(&self, entity: &Entity) -> Vec<TotalCountMarker> {
        self.state
            .lock()
            .unwrap()
            .totals
            .get(&entity.id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn analyzed_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .analyzed
            .iter()
            .map(|m| m.review_id.clone())
            .collect()
    }

    pub fn analyses(&self, entity: &Entity) -> Vec<AnalysisRecord> {
        self.state
            .lock()
            .unwrap()
            .analyses
            .get(&entity.table_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn lease_held(&self, entity: &Entity, kind: RunKind) -> bool {
        self.state
            .lock()
            .unwrap()
            .leases
            .contains(&(entity.id.clone(), kind))
    }

    pub fn insert_calls(&self) -> usize {
        self.state.lock().unwrap().insert_calls
    }

    pub fn provision_calls(&self) -> usize {
        self.state.lock().unwrap().provision_calls
    }
}

fn outage(what: &str) -> ReviewPulseError {
    ReviewPulseError::StoreRead(format!("MockReviewStore: {what} unavailable"))
}

#[async_trait]
impl ReviewStore for MockReviewStore {
    async fn ensure_provisioned(&self) -> StoreResult<()> {
        self.state.lock().unwrap().provision_calls += 1;
        Ok(())
    }

    async fn existing_review_ids(&self, entity: &Entity) -> StoreResult<HashSet<String>> {
        if self.fail_existing_ids {
            return Err(outage("existing ids"));
        }
        Ok(self.review_ids(entity).into_iter().collect())
    }

    async fn latest_entry_date(&self, entity: &Entity) -> StoreResult<Option<DateTime<Utc>>> {
        if self.fail_latest_entry {
            return Err(outage("latest entry date"));
        }
        Ok(self.reviews(entity).iter().map(|r| r.entry_date).max())
    }

    async fn insert_reviews(&self, entity: &Entity, reviews: &[Review]) -> StoreResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.insert_calls += 1;
        if self.fail_inserts {
            return Err(ReviewPulseError::StoreWrite("MockReviewStore: insert rejected".into()));
        }
        let table = state.reviews.entry(entity.table_id.clone()).or_default();
        let mut written = 0;
        for review in reviews {
            if table.iter().all(|r| r.review_id != review.review_id) {
                table.push(review.clone());
                written += 1;
            }
        }
        Ok(written)
    }

    async fn append_total_count(
        &self,
        entity: &Entity,
        marker: &TotalCountMarker,
    ) -> StoreResult<()> {
        if self.fail_totals {
            return Err(ReviewPulseError::StoreWrite("MockReviewStore: totals rejected".into()));
        }
        self.state
            .lock()
            .unwrap()
            .totals
            .entry(entity.id.clone())
            .or_default()
            .push(marker.clone());
        Ok(())
    }

    async fn latest_total_count(&self, entity: &Entity) -> StoreResult<Option<TotalCountMarker>> {
        // Append order breaks ties between equal timestamps.
        let state = self.state.lock().unwrap();
        let latest = state.totals.get(&entity.id).and_then(|markers| {
            markers
                .iter()
                .enumerate()
                .max_by_key(|(i, m)| (m.observed_at, *i))
                .map(|(_, m)| m.clone())
        });
        Ok(latest)
    }

    async fn unanalyzed_reviews(
        &self,
        entity: &Entity,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> StoreResult<Vec<Review>> {
        let state = self.state.lock().unwrap();
        let analyzed: HashSet<&str> = state.analyzed.iter().map(|m| m.review_id.as_str()).collect();
        let mut candidates: Vec<Review> = state
            .reviews
            .get(&entity.table_id)
            .map(|reviews| {
                reviews
                    .iter()
                    .filter(|r| since.map_or(true, |s| r.entry_date >= s))
                    .filter(|r| !analyzed.contains(r.review_id.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        candidates.sort_by(|a, b| b.entry_date.cmp(&a.entry_date));
        candidates.truncate(limit as usize);
        Ok(candidates)
    }

    async fn record_analysis(
        &self,
        entity: &Entity,
        record: &AnalysisRecord,
        markers: &[AnalyzedMarker],
    ) -> StoreResult<()> {
        if self.fail_record {
            return Err(ReviewPulseError::StoreWrite("MockReviewStore: analysis rejected".into()));
        }
        let mut state = self.state.lock().unwrap();
        state
            .analyses
            .entry(entity.table_id.clone())
            .or_default()
            .push(record.clone());
        state.analyzed.extend(markers.iter().cloned());
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        entity: &Entity,
        kind: RunKind,
        _ttl: Duration,
    ) -> StoreResult<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .leases
            .insert((entity.id.clone(), kind)))
    }

    async fn release_lease(&self, entity: &Entity, kind: RunKind) -> StoreResult<()> {
        self.state
            .lock()
            .unwrap()
            .leases
            .remove(&(entity.id.clone(), kind));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSummaryEngine
// ---------------------------------------------------------------------------

enum EngineReply {
    Text(String),
    Fail(String),
}

/// Queue-based engine. Replies are consumed in order; once the queue is empty
/// the fallback text (if any) is returned, otherwise the call fails.
#[derive(Default)]
pub struct MockSummaryEngine {
    replies: Mutex<VecDeque<EngineReply>>,
    fallback: Option<String>,
    requests: Mutex<Vec<SummaryRequest>>,
}

impl MockSummaryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, text: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(EngineReply::Text(text.into()));
        self
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(EngineReply::Fail(message.into()));
        self
    }

    pub fn always(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn requests(&self) -> Vec<SummaryRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl SummaryEngine for MockSummaryEngine {
    async fn complete(&self, request: &SummaryRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(EngineReply::Text(text)) => Ok(text),
            Some(EngineReply::Fail(message)) => bail!("MockSummaryEngine: {message}"),
            None => match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => bail!("MockSummaryEngine: no reply queued"),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

pub fn entity(name: &str) -> Entity {
    Entity {
        id: format!("id-{}", name.to_lowercase()),
        name: name.to_string(),
        partner_id: "1798".to_string(),
        table_id: name.to_string(),
    }
}

/// A valid raw review as the API would return it.
pub fn raw_review(id: &str, entry_date: DateTime<Utc>) -> RawReview {
    serde_json::from_value(json!({
        "id": id,
        "title": format!("Review {id}"),
        "texts": {"GENERAL": format!("Body of review {id}")},
        "ratings": {"GENERAL": {"GENERAL": 5.0}},
        "entryDate": entry_date.to_rfc3339(),
        "user": {"id": format!("user-{id}")},
        "children": "NO"
    }))
    .expect("valid raw review")
}

/// A raw review missing its author, rejected by validation.
pub fn invalid_raw_review(id: &str, entry_date: DateTime<Utc>) -> RawReview {
    serde_json::from_value(json!({
        "id": id,
        "title": format!("Review {id}"),
        "entryDate": entry_date.to_rfc3339(),
    }))
    .expect("raw review")
}

/// A stored review.
pub fn review(id: &str, entry_date: DateTime<Utc>) -> Review {
    Review {
        review_id: id.to_string(),
        title: format!("Review {id}"),
        body: format!("Body of review {id}"),
        rating: Some(5.0),
        travel_date: None,
        entry_date,
        user_id: format!("user-{id}"),
        travel_reason: None,
        traveled_with: None,
        children: 0,
    }
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::days(days)
}

/// Engine response JSON with the given sentiment and positive points.
pub fn summary_json(sentiment: &str, positives: &[&str]) -> String {
    json!({
        "overall_sentiment": sentiment,
        "positive_points": positives,
        "negative_points": [],
        "common_themes": [],
        "areas_for_improvement": []
    })
    .to_string()
}

/// Fetch config with no pacing and near-instant retries.
pub fn fast_fetch_config(page_size: u32) -> FetchConfig {
    FetchConfig {
        page_size,
        max_offset: 1000,
        page_delay: Duration::ZERO,
        retry: RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            multiplier: 2,
        },
    }
}

pub fn fast_summarize_config() -> SummarizeConfig {
    SummarizeConfig {
        chunk_delay: Duration::ZERO,
        ..SummarizeConfig::default()
    }
}

pub fn analysis_config() -> AnalysisConfig {
    AnalysisConfig::default()
}
