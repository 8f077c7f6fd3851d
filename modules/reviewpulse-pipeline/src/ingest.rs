//! Incremental ingestion: fetch what the store does not have yet, validate it,
//! and persist it in one batch per run.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use review_api_client::RawReview;
use reviewpulse_common::{Entity, Review, ReviewPulseError, RunKind, TotalCountMarker};

use crate::fetch::{fetch_all, FetchConfig, KnownState, StopReason};
use crate::lease::{with_lease, DEFAULT_LEASE_TTL};
use crate::traits::{ReviewSource, ReviewStore};

/// What one ingestion run did for an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub inserted: usize,
    pub invalid: usize,
    pub reported_total: Option<i64>,
    pub pages_fetched: u32,
    pub stop: StopReason,
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} new reviews, {} invalid, {} pages ({})",
            self.inserted, self.invalid, self.pages_fetched, self.stop
        )?;
        if let Some(total) = self.reported_total {
            write!(f, ", source total {total}")?;
        }
        Ok(())
    }
}

pub struct Ingestor {
    source: Arc<dyn ReviewSource>,
    store: Arc<dyn ReviewStore>,
    config: FetchConfig,
    lease_ttl: Duration,
}

impl Ingestor {
    pub fn new(source: Arc<dyn ReviewSource>, store: Arc<dyn ReviewStore>, config: FetchConfig) -> Self {
        Self {
            source,
            store,
            config,
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn store(&self) -> &Arc<dyn ReviewStore> {
        &self.store
    }

    /// Bring the store up to date with the source for one entity.
    ///
    /// A failed upstream walk still persists whatever it collected. Only a
    /// failed batch write, a held lease or cancellation fail the run.
    pub async fn ingest(
        &self,
        entity: &Entity,
        cancel: &CancellationToken,
    ) -> Result<IngestOutcome, ReviewPulseError> {
        with_lease(
            self.store.as_ref(),
            entity,
            RunKind::Ingest,
            self.lease_ttl,
            self.ingest_unleased(entity, cancel),
        )
        .await
    }

    async fn ingest_unleased(
        &self,
        entity: &Entity,
        cancel: &CancellationToken,
    ) -> Result<IngestOutcome, ReviewPulseError> {
        let name = entity.name.as_str();
        info!(entity = name, "Starting review ingestion");

        let known = self.load_known_state(entity).await;

        let outcome = fetch_all(self.source.as_ref(), entity, &known, &self.config, cancel).await;
        if outcome.stop == StopReason::Cancelled {
            warn!(entity = name, "Ingestion cancelled, nothing persisted");
            return Err(ReviewPulseError::Cancelled);
        }
        if outcome.stop.is_failure() {
            warn!(entity = name, stop = %outcome.stop, collected = outcome.reviews.len(), "Walk ended early, keeping partial results");
        }

        if let Some(total) = outcome.reported_total {
            let marker = TotalCountMarker {
                entity_id: entity.id.clone(),
                total_count: total,
                observed_at: Utc::now(),
            };
            match self.store.append_total_count(entity, &marker).await {
                Ok(()) => info!(entity = name, total, "Recorded source total"),
                Err(e) => warn!(entity = name, error = %e, "Failed to record source total"),
            }
        }

        let (valid, invalid) = validate_all(outcome.reviews);
        if invalid > 0 {
            warn!(entity = name, invalid, "Dropped invalid reviews");
        }

        let inserted = if valid.is_empty() {
            info!(entity = name, "No new reviews to insert");
            0
        } else {
            let written = self.store.insert_reviews(entity, &valid).await?;
            let written = usize::try_from(written).unwrap_or(usize::MAX);
            if written != valid.len() {
                warn!(entity = name, expected = valid.len(), written, "Some reviews were already present");
            }
            info!(entity = name, count = written, "Inserted new reviews");
            written
        };

        let result = IngestOutcome {
            inserted,
            invalid,
            reported_total: outcome.reported_total,
            pages_fetched: outcome.pages_fetched,
            stop: outcome.stop,
        };
        info!(entity = name, "{result}");
        Ok(result)
    }

    /// Read the dedup set and the latest stored entry. A failed read degrades
    /// to an empty set or no early stop rather than failing the run.
    async fn load_known_state(&self, entity: &Entity) -> KnownState {
        let name = entity.name.as_str();

        let existing_ids = match self.store.existing_review_ids(entity).await {
            Ok(ids) => {
                info!(entity = name, count = ids.len(), "Loaded existing review ids");
                ids
            }
            Err(e) => {
                warn!(entity = name, error = %e, "Could not read existing review ids, continuing with none");
                HashSet::new()
            }
        };

        let latest_entry = match self.store.latest_entry_date(entity).await {
            Ok(latest) => latest,
            Err(e) => {
                warn!(entity = name, error = %e, "Could not read latest entry date, walking without early stop");
                None
            }
        };

        KnownState {
            existing_ids,
            latest_entry,
        }
    }
}

/// Split raw reviews into persistable ones and a count of rejects.
pub fn validate_all(raw: Vec<RawReview>) -> (Vec<Review>, usize) {
    let mut valid = Vec::with_capacity(raw.len());
    let mut invalid = 0;
    for item in raw {
        match validate(&item) {
            Some(review) => valid.push(review),
            None => {
                invalid += 1;
                debug!(review = ?item, "Invalid review");
            }
        }
    }
    (valid, invalid)
}

/// A review is persistable when it has an id, a non-empty title, an author id
/// and a parseable entry time.
pub fn validate(raw: &RawReview) -> Option<Review> {
    let review_id = raw.canonical_id()?;
    let title = raw.title.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
    let user_id = raw.user_id()?;
    let entry_date = raw.entry_time()?;

    Some(Review {
        review_id,
        title: title.to_string(),
        body: raw.general_text(),
        rating: raw.general_rating(),
        travel_date: raw.travel_time(),
        entry_date,
        user_id,
        travel_reason: raw.travel_reason.clone(),
        traveled_with: raw.traveled_with.clone(),
        children: parse_children(raw.children.as_deref()),
    })
}

/// Map the source's children enum to a count. MORE is stored as 5; anything
/// unrecognised as 0.
pub fn parse_children(value: Option<&str>) -> i32 {
    match value.map(str::trim) {
        Some("ONE") => 1,
        Some("TWO") => 2,
        Some("THREE") => 3,
        Some("FOUR") => 4,
        Some("MORE") => 5,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawReview {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn children_enum_maps_to_counts() {
        assert_eq!(parse_children(Some("NO")), 0);
        assert_eq!(parse_children(Some("ONE")), 1);
        assert_eq!(parse_children(Some("FOUR")), 4);
        assert_eq!(parse_children(Some("MORE")), 5);
        assert_eq!(parse_children(Some("SEVERAL")), 0);
        assert_eq!(parse_children(None), 0);
    }

    #[test]
    fn complete_review_is_normalized() {
        let review = validate(&raw(json!({
            "id": "r-1",
            "title": "  Great stay ",
            "texts": {"GENERAL": "Friendly staff."},
            "ratings": {"GENERAL": {"GENERAL": 5.5}},
            "travelDate": "2024-05-01",
            "entryDate": "2024-05-10T08:30:00Z",
            "user": {"id": 42},
            "travelReason": "LEISURE",
            "traveledWith": "FAMILY",
            "children": "TWO"
        })))
        .unwrap();

        assert_eq!(review.review_id, "r-1");
        assert_eq!(review.title, "Great stay");
        assert_eq!(review.body, "Friendly staff.");
        assert_eq!(review.rating, Some(5.5));
        assert_eq!(review.user_id, "42");
        assert_eq!(review.children, 2);
        assert!(review.travel_date.is_some());
        assert_eq!(review.traveled_with.as_deref(), Some("FAMILY"));
    }

    #[test]
    fn missing_required_fields_are_rejected() {
        let base = json!({
            "id": "r-1",
            "title": "Fine",
            "entryDate": "2024-05-10T08:30:00Z",
            "user": {"id": "u-1"}
        });
        assert!(validate(&raw(base.clone())).is_some());

        for field in ["id", "title", "entryDate", "user"] {
            let mut value = base.clone();
            value.as_object_mut().unwrap().remove(field);
            assert!(validate(&raw(value)).is_none(), "missing {field} should be rejected");
        }

        let mut blank_title = base.clone();
        blank_title["title"] = json!("   ");
        assert!(validate(&raw(blank_title)).is_none());

        let mut anonymous = base;
        anonymous["user"] = json!({});
        assert!(validate(&raw(anonymous)).is_none());
    }

    #[test]
    fn validate_all_counts_rejects() {
        let (valid, invalid) = validate_all(vec![
            raw(json!({"id": "a", "title": "t", "entryDate": "2024-01-01", "user": {"id": 1}})),
            raw(json!({"title": "no id", "entryDate": "2024-01-01", "user": {"id": 1}})),
        ]);
        assert_eq!(valid.len(), 1);
        assert_eq!(invalid, 1);
    }
}
