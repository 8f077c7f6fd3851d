// Capability boundaries of the pipeline.
//
// ReviewSource: the paginated upstream review API.
// ReviewStore: dedup reads, batch writes, append-only markers and run leases.
// SummaryEngine: a single-turn language model call returning free text.
//
// Production implementations live next to the traits (API client, OpenAI) and in
// `store::postgres`; in-memory mocks live in `testing`.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ai_client::OpenAi;
use review_api_client::{PageQuery, ReviewApiClient, ReviewApiError, ReviewPage};
use reviewpulse_common::{
    AnalysisRecord, AnalyzedMarker, Entity, Review, ReviewPulseError, RunKind, TotalCountMarker,
};

// ---------------------------------------------------------------------------
// ReviewSource
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Fetch one page of reviews for `entity`, newest entries first.
    async fn fetch_page(
        &self,
        entity: &Entity,
        offset: u32,
        page_size: u32,
    ) -> std::result::Result<ReviewPage, ReviewApiError>;
}

#[async_trait]
impl ReviewSource for ReviewApiClient {
    async fn fetch_page(
        &self,
        entity: &Entity,
        offset: u32,
        page_size: u32,
    ) -> std::result::Result<ReviewPage, ReviewApiError> {
        let query = PageQuery {
            entity_id: entity.id.clone(),
            partner_id: entity.partner_id.clone(),
            limit: page_size,
            offset,
        };
        ReviewApiClient::fetch_page(self, &query).await
    }
}

// ---------------------------------------------------------------------------
// ReviewStore
// ---------------------------------------------------------------------------

pub type StoreResult<T> = std::result::Result<T, ReviewPulseError>;

#[async_trait]
pub trait ReviewStore: Send + Sync {
    // --- Provisioning ---

    /// Make sure every table the pipeline writes to exists. Idempotent.
    async fn ensure_provisioned(&self) -> StoreResult<()>;

    // --- Ingestion ---

    /// All review ids currently stored for the entity.
    async fn existing_review_ids(&self, entity: &Entity) -> StoreResult<HashSet<String>>;

    /// Entry time of the newest stored review, if any.
    async fn latest_entry_date(&self, entity: &Entity) -> StoreResult<Option<DateTime<Utc>>>;

    /// Insert a batch of reviews in one write. Returns the number of rows written.
    async fn insert_reviews(&self, entity: &Entity, reviews: &[Review]) -> StoreResult<u64>;

    /// Append a total-count marker. Existing markers are never touched.
    async fn append_total_count(
        &self,
        entity: &Entity,
        marker: &TotalCountMarker,
    ) -> StoreResult<()>;

    /// The authoritative (latest observed) total-count marker.
    async fn latest_total_count(&self, entity: &Entity) -> StoreResult<Option<TotalCountMarker>>;

    // --- Analysis ---

    /// Reviews without an analyzed marker, newest first. `since` bounds the
    /// entry time from below when given.
    async fn unanalyzed_reviews(
        &self,
        entity: &Entity,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> StoreResult<Vec<Review>>;

    /// Persist one run record together with its analyzed markers.
    async fn record_analysis(
        &self,
        entity: &Entity,
        record: &AnalysisRecord,
        markers: &[AnalyzedMarker],
    ) -> StoreResult<()>;

    // --- Run leases ---

    /// Try to take the per-entity lease for `kind`. Leases older than `ttl`
    /// are reclaimed. Returns false if another runner holds it.
    async fn try_acquire_lease(
        &self,
        entity: &Entity,
        kind: RunKind,
        ttl: Duration,
    ) -> StoreResult<bool>;

    /// Release a lease taken by this process.
    async fn release_lease(&self, entity: &Entity, kind: RunKind) -> StoreResult<()>;
}

// ---------------------------------------------------------------------------
// SummaryEngine
// ---------------------------------------------------------------------------

/// A single-turn summarization request.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
}

#[async_trait]
pub trait SummaryEngine: Send + Sync {
    /// Send one request and return the raw response text.
    async fn complete(&self, request: &SummaryRequest) -> Result<String>;
}

#[async_trait]
impl SummaryEngine for OpenAi {
    async fn complete(&self, request: &SummaryRequest) -> Result<String> {
        self.chat_completion(
            request.system_prompt.as_str(),
            request.user_prompt.as_str(),
            request.temperature,
        )
        .await
    }
}
