// Postgres implementation of the durable store.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use reviewpulse_common::{
    AnalysisRecord, AnalyzedMarker, Entity, Review, ReviewPulseError, RunKind, TotalCountMarker,
};

use crate::traits::{ReviewStore, StoreResult};

/// Rows per INSERT statement; keeps bind parameters well under the protocol limit.
const INSERT_CHUNK: usize = 1000;

pub struct PgReviewStore {
    pool: PgPool,
    /// Identifies this process's leases.
    holder: Uuid,
}

/// A row from the `reviews` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ReviewRow {
    review_id: String,
    title: String,
    body: String,
    rating: Option<f64>,
    travel_date: Option<DateTime<Utc>>,
    entry_date: DateTime<Utc>,
    user_id: String,
    travel_reason: Option<String>,
    traveled_with: Option<String>,
    children: i32,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Review {
            review_id: row.review_id,
            title: row.title,
            body: row.body,
            rating: row.rating,
            travel_date: row.travel_date,
            entry_date: row.entry_date,
            user_id: row.user_id,
            travel_reason: row.travel_reason,
            traveled_with: row.traveled_with,
            children: row.children,
        }
    }
}

/// A row from the `review_totals` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct TotalRow {
    entity_id: String,
    total_reviews: i64,
    observed_at: DateTime<Utc>,
}

fn read_err(e: sqlx::Error) -> ReviewPulseError {
    ReviewPulseError::StoreRead(e.to_string())
}

fn write_err(e: sqlx::Error) -> ReviewPulseError {
    ReviewPulseError::StoreWrite(e.to_string())
}

impl PgReviewStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            holder: Uuid::new_v4(),
        }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| ReviewPulseError::StoreRead(format!("connect failed: {e}")))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    async fn ensure_provisioned(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ReviewPulseError::StoreWrite(format!("migration failed: {e}")))?;
        Ok(())
    }

    async fn existing_review_ids(&self, entity: &Entity) -> StoreResult<HashSet<String>> {
        let ids = sqlx::query_scalar::<_, String>("SELECT review_id FROM reviews WHERE table_id = $1")
            .bind(&entity.table_id)
            .fetch_all(&self.pool)
            .await
            .map_err(read_err)?;
        Ok(ids.into_iter().collect())
    }

    async fn latest_entry_date(&self, entity: &Entity) -> StoreResult<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(entry_date) FROM reviews WHERE table_id = $1",
        )
        .bind(&entity.table_id)
        .fetch_one(&self.pool)
        .await
        .map_err(read_err)
    }

    async fn insert_reviews(&self, entity: &Entity, reviews: &[Review]) -> StoreResult<u64> {
        if reviews.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(write_err)?;
        let mut written = 0;

        for batch in reviews.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO reviews \
                 (table_id, review_id, title, body, rating, travel_date, entry_date, \
                  user_id, travel_reason, traveled_with, children) ",
            );
            qb.push_values(batch, |mut row, r| {
                row.push_bind(&entity.table_id)
                    .push_bind(&r.review_id)
                    .push_bind(&r.title)
                    .push_bind(&r.body)
                    .push_bind(r.rating)
                    .push_bind(r.travel_date)
                    .push_bind(r.entry_date)
                    .push_bind(&r.user_id)
                    .push_bind(&r.travel_reason)
                    .push_bind(&r.traveled_with)
                    .push_bind(r.children);
            });
            // Ingestion already filters known ids; this only guards against a concurrent writer.
            qb.push(" ON CONFLICT (table_id, review_id) DO NOTHING");

            let result = qb.build().execute(&mut *tx).await.map_err(write_err)?;
            written += result.rows_affected();
        }

        tx.commit().await.map_err(write_err)?;
        debug!(table = entity.table_id.as_str(), written, "Inserted review batch");
        Ok(written)
    }

    async fn append_total_count(
        &self,
        entity: &Entity,
        marker: &TotalCountMarker,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO review_totals (entity_id, entity_name, total_reviews, observed_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&marker.entity_id)
        .bind(&entity.name)
        .bind(marker.total_count)
        .bind(marker.observed_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    async fn latest_total_count(&self, entity: &Entity) -> StoreResult<Option<TotalCountMarker>> {
        let row = sqlx::query_as::<_, TotalRow>(
            r#"
            SELECT entity_id, total_reviews, observed_at FROM review_totals
            WHERE entity_id = $1
            ORDER BY observed_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(&entity.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;

        Ok(row.map(|r| TotalCountMarker {
            entity_id: r.entity_id,
            total_count: r.total_reviews,
            observed_at: r.observed_at,
        }))
    }

    async fn unanalyzed_reviews(
        &self,
        entity: &Entity,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> StoreResult<Vec<Review>> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            r#"
            SELECT r.review_id, r.title, r.body, r.rating, r.travel_date, r.entry_date,
                   r.user_id, r.travel_reason, r.traveled_with, r.children
            FROM reviews r
            WHERE r.table_id = $1
              AND ($2::timestamptz IS NULL OR r.entry_date >= $2)
              AND NOT EXISTS (
                  SELECT 1 FROM analyzed_reviews a WHERE a.review_id = r.review_id
              )
            ORDER BY r.entry_date DESC
            LIMIT $3
            "#,
        )
        .bind(&entity.table_id)
        .bind(since)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;

        Ok(rows.into_iter().map(Review::from).collect())
    }

    async fn record_analysis(
        &self,
        entity: &Entity,
        record: &AnalysisRecord,
        markers: &[AnalyzedMarker],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(write_err)?;

        sqlx::query(
            r#"
            INSERT INTO review_analyses
                (id, table_id, run_at, total_reviews, analyzed_reviews, window_days,
                 overall_sentiment, positive_points, negative_points, common_themes,
                 areas_for_improvement)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entity.table_id)
        .bind(record.run_at)
        .bind(record.total_reviews)
        .bind(record.analyzed_reviews)
        .bind(record.window_days)
        .bind(&record.overall_sentiment)
        .bind(&record.positive_points)
        .bind(&record.negative_points)
        .bind(&record.common_themes)
        .bind(&record.areas_for_improvement)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        for batch in markers.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO analyzed_reviews (review_id, analyzed_at) ");
            qb.push_values(batch, |mut row, m| {
                row.push_bind(&m.review_id).push_bind(m.analyzed_at);
            });
            qb.build().execute(&mut *tx).await.map_err(write_err)?;
        }

        tx.commit().await.map_err(write_err)?;
        debug!(table = entity.table_id.as_str(), markers = markers.len(), "Recorded analysis run");
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        entity: &Entity,
        kind: RunKind,
        ttl: Duration,
    ) -> StoreResult<bool> {
        sqlx::query(
            r#"
            DELETE FROM run_leases
            WHERE entity_id = $1 AND kind = $2
              AND acquired_at < now() - make_interval(secs => $3)
            "#,
        )
        .bind(&entity.id)
        .bind(kind.as_str())
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        let result = sqlx::query(
            r#"
            INSERT INTO run_leases (entity_id, kind, holder)
            VALUES ($1, $2, $3)
            ON CONFLICT (entity_id, kind) DO NOTHING
            "#,
        )
        .bind(&entity.id)
        .bind(kind.as_str())
        .bind(self.holder)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_lease(&self, entity: &Entity, kind: RunKind) -> StoreResult<()> {
        sqlx::query("DELETE FROM run_leases WHERE entity_id = $1 AND kind = $2 AND holder = $3")
            .bind(&entity.id)
            .bind(kind.as_str())
            .bind(self.holder)
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }
}
