//! Analysis run coordinator.
//!
//! One run: resolve the authoritative total, select unanalyzed candidates,
//! summarize them and persist the run record together with one analyzed marker
//! per candidate. An empty candidate set ends the run without writing anything.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reviewpulse_common::{
    AnalysisRecord, AnalysisWindow, AnalyzedMarker, Entity, ReviewPulseError, RunKind,
};

use crate::lease::{with_lease, DEFAULT_LEASE_TTL};
use crate::summarizer::{format_bullets, BatchSummarizer};
use crate::traits::ReviewStore;

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Upper bound on candidates for window runs.
    pub window_cap: u32,
    pub lease_ttl: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_cap: 50,
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }
}

/// Where a run is. Summarizing iterates the chunks in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Selecting,
    Summarizing,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Selecting => "selecting",
            Self::Summarizing => "summarizing",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No unanalyzed reviews matched the window.
    NothingToAnalyze,
    Completed {
        analyzed_reviews: usize,
        total_reviews: i64,
        chunks_skipped: usize,
    },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NothingToAnalyze => f.write_str("no unanalyzed reviews"),
            Self::Completed {
                analyzed_reviews,
                total_reviews,
                chunks_skipped,
            } => {
                write!(f, "analyzed {analyzed_reviews} reviews (source total {total_reviews})")?;
                if *chunks_skipped > 0 {
                    write!(f, ", {chunks_skipped} chunks skipped")?;
                }
                Ok(())
            }
        }
    }
}

/// Midnight UTC of the day `days` days before `now`. Window runs include
/// every review entered on or after this instant.
pub fn window_start(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    let day = now
        .date_naive()
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(chrono::NaiveDate::MIN);
    day.and_time(NaiveTime::MIN).and_utc()
}

pub struct AnalysisCoordinator {
    store: Arc<dyn ReviewStore>,
    summarizer: BatchSummarizer,
    config: AnalysisConfig,
}

impl AnalysisCoordinator {
    pub fn new(store: Arc<dyn ReviewStore>, summarizer: BatchSummarizer, config: AnalysisConfig) -> Self {
        Self {
            store,
            summarizer,
            config,
        }
    }

    /// Analyze unanalyzed reviews entered within the last `days` days.
    pub async fn run_by_window(
        &self,
        entity: &Entity,
        days: u32,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, ReviewPulseError> {
        self.run(entity, AnalysisWindow::Days(days), cancel).await
    }

    /// Analyze the `count` newest unanalyzed reviews.
    pub async fn run_by_count(
        &self,
        entity: &Entity,
        count: u32,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, ReviewPulseError> {
        self.run(entity, AnalysisWindow::Count(count), cancel).await
    }

    pub async fn run(
        &self,
        entity: &Entity,
        window: AnalysisWindow,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, ReviewPulseError> {
        with_lease(
            self.store.as_ref(),
            entity,
            RunKind::Analyze,
            self.config.lease_ttl,
            self.run_unleased(entity, window, cancel),
        )
        .await
    }

    async fn run_unleased(
        &self,
        entity: &Entity,
        window: AnalysisWindow,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, ReviewPulseError> {
        let mut phase = RunPhase::Selecting;
        let result = self.drive(entity, window, cancel, &mut phase).await;
        if let Err(e) = &result {
            warn!(entity = entity.name.as_str(), failed_in = %phase, error = %e, "Analysis run failed");
            phase = RunPhase::Failed;
        }
        debug!(entity = entity.name.as_str(), %phase, "Analysis run finished");
        result
    }

    async fn drive(
        &self,
        entity: &Entity,
        window: AnalysisWindow,
        cancel: &CancellationToken,
        phase: &mut RunPhase,
    ) -> Result<RunOutcome, ReviewPulseError> {
        let name = entity.name.as_str();
        info!(entity = name, %window, "Starting analysis run");
        let window_days = window.window_days()?;

        self.store.ensure_provisioned().await?;

        let total = self
            .store
            .latest_total_count(entity)
            .await?
            .ok_or_else(|| ReviewPulseError::MissingTotalCount {
                entity: entity.name.clone(),
            })?;

        let (since, limit) = match window {
            AnalysisWindow::Days(days) => (Some(window_start(Utc::now(), days)), self.config.window_cap),
            AnalysisWindow::Count(count) => (None, count),
        };

        if cancel.is_cancelled() {
            return Err(ReviewPulseError::Cancelled);
        }
        let candidates = self.store.unanalyzed_reviews(entity, since, limit).await?;
        if candidates.is_empty() {
            info!(entity = name, %window, "No unanalyzed reviews, nothing to do");
            *phase = RunPhase::Done;
            return Ok(RunOutcome::NothingToAnalyze);
        }
        info!(entity = name, candidates = candidates.len(), "Selected candidates");

        *phase = RunPhase::Summarizing;
        let summary = self.summarizer.summarize(name, &candidates, cancel).await?;

        *phase = RunPhase::Persisting;
        if cancel.is_cancelled() {
            return Err(ReviewPulseError::Cancelled);
        }
        let analyzed_reviews = i32::try_from(candidates.len()).map_err(|_| {
            ReviewPulseError::Config(format!("{} candidates exceed the record's range", candidates.len()))
        })?;
        let run_at = Utc::now();
        let record = AnalysisRecord {
            run_at,
            total_reviews: total.total_count,
            analyzed_reviews,
            window_days,
            overall_sentiment: summary.overall_sentiment.clone(),
            positive_points: format_bullets(summary.positive_points.as_slice()),
            negative_points: format_bullets(summary.negative_points.as_slice()),
            common_themes: format_bullets(summary.common_themes.as_slice()),
            areas_for_improvement: format_bullets(summary.areas_for_improvement.as_slice()),
        };
        let markers: Vec<AnalyzedMarker> = candidates
            .iter()
            .map(|r| AnalyzedMarker {
                review_id: r.review_id.clone(),
                analyzed_at: run_at,
            })
            .collect();
        self.store.record_analysis(entity, &record, &markers).await?;

        *phase = RunPhase::Done;
        let outcome = RunOutcome::Completed {
            analyzed_reviews: candidates.len(),
            total_reviews: total.total_count,
            chunks_skipped: summary.chunks_skipped,
        };
        info!(entity = name, %window, "{outcome}");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_starts_at_midnight_utc() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 45, 0).unwrap();
        assert_eq!(
            window_start(now, 7),
            Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap()
        );
        assert_eq!(
            window_start(now, 0),
            Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn window_crosses_month_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 30, 0).unwrap();
        assert_eq!(
            window_start(now, 30),
            Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn outcome_mentions_skipped_chunks() {
        let outcome = RunOutcome::Completed {
            analyzed_reviews: 12,
            total_reviews: 340,
            chunks_skipped: 1,
        };
        assert_eq!(
            outcome.to_string(),
            "analyzed 12 reviews (source total 340), 1 chunks skipped"
        );
    }
}
