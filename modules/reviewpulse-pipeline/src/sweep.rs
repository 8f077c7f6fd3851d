//! Sequential sweeps over the tracked entities.
//!
//! Entities are processed one at a time. A failure is recorded for that entity
//! and the sweep moves on; only cancellation ends a sweep early.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use reviewpulse_common::{AnalysisWindow, Entity, ReviewPulseError, RunKind};

use crate::analysis::{AnalysisCoordinator, RunOutcome};
use crate::ingest::{IngestOutcome, Ingestor};

/// Window of the monthly analysis in the daily sweep.
pub const MONTHLY_WINDOW_DAYS: u32 = 30;

/// Per-entity result of one step of a sweep.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityStatus {
    Ingested { entity: String, outcome: IngestOutcome },
    Analyzed { entity: String, outcome: RunOutcome },
    Failed { entity: String, kind: RunKind, error: String },
}

impl EntityStatus {
    pub fn entity(&self) -> &str {
        match self {
            Self::Ingested { entity, .. } | Self::Analyzed { entity, .. } | Self::Failed { entity, .. } => {
                entity
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    fn failed(entity: &Entity, kind: RunKind, error: &ReviewPulseError) -> Self {
        Self::Failed {
            entity: entity.name.clone(),
            kind,
            error: error.to_string(),
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingested { entity, outcome } => write!(f, "[{entity}] ingest ok: {outcome}"),
            Self::Analyzed { entity, outcome } => write!(f, "[{entity}] analyze ok: {outcome}"),
            Self::Failed { entity, kind, error } => write!(f, "[{entity}] {kind} FAILED: {error}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub statuses: Vec<EntityStatus>,
    /// Set when the sweep stopped before visiting every entity.
    pub cancelled: bool,
}

impl SweepReport {
    fn push(&mut self, status: EntityStatus) {
        if status.is_failure() {
            warn!("{status}");
        } else {
            info!("{status}");
        }
        self.statuses.push(status);
    }

    pub fn succeeded(&self) -> usize {
        self.statuses.iter().filter(|s| !s.is_failure()).count()
    }

    pub fn failed(&self) -> usize {
        self.statuses.iter().filter(|s| s.is_failure()).count()
    }

    pub fn new_reviews(&self) -> usize {
        self.statuses
            .iter()
            .map(|s| match s {
                EntityStatus::Ingested { outcome, .. } => outcome.inserted,
                _ => 0,
            })
            .sum()
    }

    pub fn reviews_analyzed(&self) -> usize {
        self.statuses
            .iter()
            .map(|s| match s {
                EntityStatus::Analyzed {
                    outcome: RunOutcome::Completed { analyzed_reviews, .. },
                    ..
                } => *analyzed_reviews,
                _ => 0,
            })
            .sum()
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for status in &self.statuses {
            writeln!(f, "{status}")?;
        }
        write!(
            f,
            "succeeded={} failed={} new_reviews={} reviews_analyzed={}",
            self.succeeded(),
            self.failed(),
            self.new_reviews(),
            self.reviews_analyzed(),
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

/// Ingest every entity in order.
pub async fn ingest_all(
    ingestor: &Ingestor,
    entities: &[Entity],
    cancel: &CancellationToken,
) -> SweepReport {
    let mut report = SweepReport::default();
    for entity in entities {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        report.push(ingest_one(ingestor, entity, cancel).await);
    }
    report
}

/// Run one analysis per entity in order.
pub async fn analyze_all(
    coordinator: &AnalysisCoordinator,
    entities: &[Entity],
    window: AnalysisWindow,
    cancel: &CancellationToken,
) -> SweepReport {
    let mut report = SweepReport::default();
    for entity in entities {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        report.push(analyze_one(coordinator, entity, window, cancel).await);
    }
    report
}

/// Whether the daily sweep also runs the monthly analysis on `today`.
pub fn is_monthly_analysis_day(today: NaiveDate) -> bool {
    today.day() == 1
}

/// Ingest every entity; on the first of the month also run a 30-day analysis
/// per entity right after its ingestion.
///
/// `coordinator` may be `None` on days without analysis.
pub async fn daily(
    ingestor: &Ingestor,
    coordinator: Option<&AnalysisCoordinator>,
    entities: &[Entity],
    today: NaiveDate,
    cancel: &CancellationToken,
) -> SweepReport {
    let with_analysis = is_monthly_analysis_day(today);
    info!(%today, with_analysis, entities = entities.len(), "Starting daily sweep");

    let mut report = SweepReport::default();
    for entity in entities {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        report.push(ingest_one(ingestor, entity, cancel).await);
        log_latest_total(ingestor, entity).await;

        if !with_analysis {
            continue;
        }
        let status = match coordinator {
            Some(coordinator) => {
                analyze_one(coordinator, entity, AnalysisWindow::Days(MONTHLY_WINDOW_DAYS), cancel).await
            }
            None => EntityStatus::failed(
                entity,
                RunKind::Analyze,
                &ReviewPulseError::Config("summarization engine is not configured".into()),
            ),
        };
        report.push(status);
    }
    report
}

async fn ingest_one(ingestor: &Ingestor, entity: &Entity, cancel: &CancellationToken) -> EntityStatus {
    match ingestor.ingest(entity, cancel).await {
        Ok(outcome) => EntityStatus::Ingested {
            entity: entity.name.clone(),
            outcome,
        },
        Err(e) => EntityStatus::failed(entity, RunKind::Ingest, &e),
    }
}

async fn analyze_one(
    coordinator: &AnalysisCoordinator,
    entity: &Entity,
    window: AnalysisWindow,
    cancel: &CancellationToken,
) -> EntityStatus {
    match coordinator.run(entity, window, cancel).await {
        Ok(outcome) => EntityStatus::Analyzed {
            entity: entity.name.clone(),
            outcome,
        },
        Err(e) => EntityStatus::failed(entity, RunKind::Analyze, &e),
    }
}

async fn log_latest_total(ingestor: &Ingestor, entity: &Entity) {
    match ingestor.store().latest_total_count(entity).await {
        Ok(Some(marker)) => info!(
            entity = entity.name.as_str(),
            total = marker.total_count,
            observed_at = %marker.observed_at,
            "Latest recorded total"
        ),
        Ok(None) => info!(entity = entity.name.as_str(), "No total recorded yet"),
        Err(e) => warn!(entity = entity.name.as_str(), error = %e, "Could not read latest total"),
    }
}
