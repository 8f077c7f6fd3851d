use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::ReviewPulseError;

const DEFAULT_REVIEW_API_BASE_URL: &str = "https://www.holidaycheck.de/svc/api-hotelreview/v3";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Durable store
    pub database_url: String,

    // Summarization engine
    pub openai_api_key: Option<String>,
    pub openai_model: String,

    // Review source
    pub review_api_base_url: String,
    pub review_api_locale: String,
    pub page_size: u32,
    pub max_offset: u32,
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub page_delay: Duration,

    // Analysis pacing
    pub chunk_delay: Duration,

    // Entity registry override
    pub entities_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ReviewPulseError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ReviewPulseError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url: var("DATABASE_URL").ok_or_else(|| {
                ReviewPulseError::Config("DATABASE_URL environment variable is required".into())
            })?,
            openai_api_key: var("OPENAI_API_KEY"),
            openai_model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            review_api_base_url: var("REVIEW_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_REVIEW_API_BASE_URL.to_string()),
            review_api_locale: var("REVIEW_API_LOCALE").unwrap_or_else(|| "de".to_string()),
            page_size: parse_or("REVIEW_PAGE_SIZE", var("REVIEW_PAGE_SIZE"), 50)?,
            max_offset: parse_or("REVIEW_MAX_OFFSET", var("REVIEW_MAX_OFFSET"), 1000)?,
            max_retries: parse_or("REVIEW_MAX_RETRIES", var("REVIEW_MAX_RETRIES"), 3)?,
            initial_retry_delay: Duration::from_millis(parse_or(
                "REVIEW_RETRY_DELAY_MS",
                var("REVIEW_RETRY_DELAY_MS"),
                1000,
            )?),
            page_delay: Duration::from_millis(parse_or(
                "REVIEW_PAGE_DELAY_MS",
                var("REVIEW_PAGE_DELAY_MS"),
                1000,
            )?),
            chunk_delay: Duration::from_secs(parse_or(
                "SUMMARY_CHUNK_DELAY_SECS",
                var("SUMMARY_CHUNK_DELAY_SECS"),
                60,
            )?),
            entities_path: var("ENTITIES_PATH").map(PathBuf::from),
        })
        .and_then(Self::validated)
    }

    fn validated(self) -> Result<Self, ReviewPulseError> {
        if self.page_size == 0 {
            return Err(ReviewPulseError::Config(
                "REVIEW_PAGE_SIZE must be greater than zero".into(),
            ));
        }
        Ok(self)
    }

    /// The summarization credential, required only by analysis entry points.
    pub fn require_openai_key(&self) -> Result<&str, ReviewPulseError> {
        self.openai_api_key.as_deref().ok_or_else(|| {
            ReviewPulseError::Config("OPENAI_API_KEY environment variable is required".into())
        })
    }

    /// Log which settings are active without exposing secrets.
    pub fn log_redacted(&self) {
        let openai_api_key = if self.openai_api_key.is_some() {
            "(set)"
        } else {
            "(missing)"
        };
        info!(
            database_url = "(set)",
            openai_api_key,
            openai_model = self.openai_model.as_str(),
            review_api = self.review_api_base_url.as_str(),
            locale = self.review_api_locale.as_str(),
            page_size = self.page_size,
            max_offset = self.max_offset,
            max_retries = self.max_retries,
            chunk_delay_secs = self.chunk_delay.as_secs(),
            entities_path = ?self.entities_path,
            "Configuration loaded"
        );
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, ReviewPulseError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ReviewPulseError::Config(format!("{key} must be a number, got \"{raw}\""))),
        None => Ok(default),
    }
}
