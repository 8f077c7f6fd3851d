//! Batch summarizer: chunk the candidate reviews, ask the engine for one JSON
//! summary per chunk, and fold the parsed chunks into a single summary.
//!
//! Chunks run strictly one after another with a pacing delay between engine
//! calls. A response that is not a JSON object is logged and skipped; it never
//! fails the run. A failure of the engine itself does.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ai_client::{strip_code_blocks, truncate_to_char_boundary};
use review_api_client::cancellable_sleep;
use reviewpulse_common::{Config, Review, ReviewPulseError};

use crate::traits::{SummaryEngine, SummaryRequest};

const SYSTEM_PROMPT: &str = r#"Du bist ein Experte für Hotelbewertungen. Analysiere die folgenden Bewertungen und erstelle eine Zusammenfassung im folgenden JSON-Format (ohne Markdown-Formatierung):
{
  "overall_sentiment": "Gesamteindruck der Bewertungen",
  "positive_points": ["Positivpunkt 1", "Positivpunkt 2", ...],
  "negative_points": ["Negativpunkt 1", "Negativpunkt 2", ...],
  "common_themes": ["Hauptthema 1", "Hauptthema 2", ...],
  "areas_for_improvement": ["Verbesserungsbereich 1", "Verbesserungsbereich 2", ...]
}"#;

#[derive(Debug, Clone)]
pub struct SummarizeConfig {
    pub chunk_size: usize,
    /// Pause between consecutive engine calls.
    pub chunk_delay: Duration,
    pub temperature: f32,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            chunk_delay: Duration::from_secs(60),
            temperature: 0.7,
        }
    }
}

impl SummarizeConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_delay: config.chunk_delay,
            ..Self::default()
        }
    }
}

// --- Chunk parsing ---

#[derive(Debug, Error, PartialEq)]
pub enum MalformedSummary {
    #[error("response is not valid JSON: {0}")]
    NotJson(String),
    #[error("response JSON is not an object")]
    NotAnObject,
}

/// One chunk's validated contribution. Missing or non-list fields are empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkSummary {
    pub overall_sentiment: String,
    pub positive_points: Vec<String>,
    pub negative_points: Vec<String>,
    pub common_themes: Vec<String>,
    pub areas_for_improvement: Vec<String>,
}

/// Parse an engine response, tolerating a surrounding code fence.
pub fn parse_chunk_response(text: &str) -> Result<ChunkSummary, MalformedSummary> {
    let cleaned = strip_code_blocks(text);
    let value: Value =
        serde_json::from_str(cleaned).map_err(|e| MalformedSummary::NotJson(e.to_string()))?;
    let object = value.as_object().ok_or(MalformedSummary::NotAnObject)?;

    Ok(ChunkSummary {
        overall_sentiment: object
            .get("overall_sentiment")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string(),
        positive_points: string_list(object, "positive_points"),
        negative_points: string_list(object, "negative_points"),
        common_themes: string_list(object, "common_themes"),
        areas_for_improvement: string_list(object, "areas_for_improvement"),
    })
}

fn string_list(object: &Map<String, Value>, key: &str) -> Vec<String> {
    let Some(Value::Array(items)) = object.get(key) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

// --- Merge ---

/// Insertion-ordered set of strings with exact, case-sensitive equality.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedSet {
    items: Vec<String>,
    seen: HashSet<String>,
}

impl OrderedSet {
    /// Returns false if the value was already present.
    pub fn insert(&mut self, value: String) -> bool {
        if self.seen.contains(&value) {
            return false;
        }
        self.seen.insert(value.clone());
        self.items.push(value);
        true
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Extend<String> for OrderedSet {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedSummary {
    pub overall_sentiment: String,
    pub positive_points: OrderedSet,
    pub negative_points: OrderedSet,
    pub common_themes: OrderedSet,
    pub areas_for_improvement: OrderedSet,
    pub chunks_merged: usize,
    pub chunks_skipped: usize,
}

impl MergedSummary {
    /// Fold one chunk in: sentiment is last-write-wins, lists are unioned in
    /// first-seen order.
    pub fn merge(mut self, chunk: ChunkSummary) -> Self {
        self.overall_sentiment = chunk.overall_sentiment;
        self.positive_points.extend(chunk.positive_points);
        self.negative_points.extend(chunk.negative_points);
        self.common_themes.extend(chunk.common_themes);
        self.areas_for_improvement.extend(chunk.areas_for_improvement);
        self.chunks_merged += 1;
        self
    }

    /// Record a chunk whose response was discarded.
    pub fn skip(mut self) -> Self {
        self.chunks_skipped += 1;
        self
    }
}

/// Render list items as `• item` lines for the stored run record.
pub fn format_bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("• {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The user prompt for one chunk: rating, title and body of each review.
pub fn render_prompt(chunk: &[Review]) -> String {
    let reviews = chunk
        .iter()
        .map(|r| {
            let rating = r
                .rating
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            format!("Bewertung: {rating}/6\nTitel: {}\nKommentar: {}\n", r.title, r.body)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("Analysiere diese Hotelbewertungen:\n\n{reviews}")
}

// --- Driver ---

pub struct BatchSummarizer {
    engine: Arc<dyn SummaryEngine>,
    config: SummarizeConfig,
}

impl BatchSummarizer {
    pub fn new(engine: Arc<dyn SummaryEngine>, config: SummarizeConfig) -> Self {
        Self { engine, config }
    }

    /// Summarize `reviews` chunk by chunk into one merged summary.
    pub async fn summarize(
        &self,
        label: &str,
        reviews: &[Review],
        cancel: &CancellationToken,
    ) -> Result<MergedSummary, ReviewPulseError> {
        let chunk_size = self.config.chunk_size.max(1);
        let chunks: Vec<&[Review]> = reviews.chunks(chunk_size).collect();
        let mut summary = MergedSummary::default();

        for (i, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ReviewPulseError::Cancelled);
            }

            info!(
                entity = label,
                chunk = i + 1,
                of = chunks.len(),
                reviews = chunk.len(),
                "Summarizing chunk"
            );

            let request = SummaryRequest {
                system_prompt: SYSTEM_PROMPT.to_string(),
                user_prompt: render_prompt(chunk),
                temperature: self.config.temperature,
            };
            let response = self.engine.complete(&request).await.map_err(|e| {
                ReviewPulseError::Upstream(format!("summarization engine failed: {e:#}"))
            })?;

            summary = match parse_chunk_response(&response) {
                Ok(parsed) => summary.merge(parsed),
                Err(e) => {
                    warn!(
                        entity = label,
                        chunk = i + 1,
                        error = %e,
                        response = truncate_to_char_boundary(&response, 500),
                        "Discarding malformed chunk response"
                    );
                    summary.skip()
                }
            };

            if i + 1 < chunks.len() && !cancellable_sleep(cancel, self.config.chunk_delay).await {
                return Err(ReviewPulseError::Cancelled);
            }
        }

        info!(
            entity = label,
            merged = summary.chunks_merged,
            skipped = summary.chunks_skipped,
            "Summarization complete"
        );
        Ok(summary)
    }
}
