use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReviewPulseError;

// --- Entities ---

/// A tracked subject (e.g. a hotel) whose reviews are ingested and analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Upstream identifier used in the review API filter.
    pub id: String,
    /// Display name, also used for CLI filtering.
    pub name: String,
    /// Tenant-scoped partner credential for the review API.
    #[serde(rename = "partnerId")]
    pub partner_id: String,
    /// Store partition this entity's reviews and analyses live in.
    #[serde(rename = "tableId")]
    pub table_id: String,
}

// --- Reviews ---

/// A validated review, ready to persist. `review_id` is the dedup key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub review_id: String,
    pub title: String,
    pub body: String,
    pub rating: Option<f64>,
    pub travel_date: Option<DateTime<Utc>>,
    pub entry_date: DateTime<Utc>,
    pub user_id: String,
    pub travel_reason: Option<String>,
    pub traveled_with: Option<String>,
    pub children: i32,
}

// --- Markers ---

/// Append-only record of the total the upstream API reported at fetch time.
/// The latest by `observed_at` is authoritative; values may move backwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalCountMarker {
    pub entity_id: String,
    pub total_count: i64,
    pub observed_at: DateTime<Utc>,
}

/// Written once a review has been included in a completed analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedMarker {
    pub review_id: String,
    pub analyzed_at: DateTime<Utc>,
}

// --- Analysis ---

/// How an analysis run selects its candidate reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisWindow {
    /// Reviews entered within the last N days, capped at the window limit.
    Days(u32),
    /// The N newest unanalyzed reviews, no time filter.
    Count(u32),
}

impl AnalysisWindow {
    /// Stored `window_days`; zero marks a count-based run. A day count the
    /// column cannot hold is rejected.
    pub fn window_days(&self) -> Result<i32, ReviewPulseError> {
        match self {
            Self::Days(days) => i32::try_from(*days).map_err(|_| {
                ReviewPulseError::Config(format!("analysis window of {days} days is out of range"))
            }),
            Self::Count(_) => Ok(0),
        }
    }
}

impl fmt::Display for AnalysisWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Days(days) => write!(f, "last {days} days"),
            Self::Count(count) => write!(f, "latest {count} reviews"),
        }
    }
}

/// One row per completed analysis run. Never edited after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub run_at: DateTime<Utc>,
    pub total_reviews: i64,
    pub analyzed_reviews: i32,
    pub window_days: i32,
    pub overall_sentiment: String,
    pub positive_points: String,
    pub negative_points: String,
    pub common_themes: String,
    pub areas_for_improvement: String,
}

// --- Run leases ---

/// The two independently invocable entry points, each with its own lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunKind {
    Ingest,
    Analyze,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Analyze => "analyze",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_runs_store_zero_window() {
        assert_eq!(AnalysisWindow::Count(30).window_days().unwrap(), 0);
        assert_eq!(AnalysisWindow::Count(u32::MAX).window_days().unwrap(), 0);
        assert_eq!(AnalysisWindow::Days(7).window_days().unwrap(), 7);
    }

    #[test]
    fn oversized_day_window_is_rejected() {
        let max = i32::MAX as u32;
        assert_eq!(AnalysisWindow::Days(max).window_days().unwrap(), i32::MAX);
        assert!(matches!(
            AnalysisWindow::Days(max + 1).window_days(),
            Err(ReviewPulseError::Config(_))
        ));
    }

    #[test]
    fn entity_deserializes_from_registry_json() {
        let entity: Entity = serde_json::from_str(
            r#"{"id": "abc", "name": "Jagdhof", "partnerId": "1798", "tableId": "Jagdhof"}"#,
        )
        .unwrap();
        assert_eq!(entity.partner_id, "1798");
        assert_eq!(entity.table_id, "Jagdhof");
    }
}
