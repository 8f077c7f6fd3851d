use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReviewApiError>;

#[derive(Debug, Error)]
pub enum ReviewApiError {
    #[error("Rate limited by review API")]
    RateLimited,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Cancelled")]
    Cancelled,
}

impl ReviewApiError {
    /// Only throttling is worth retrying at the same offset.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReviewApiError::RateLimited)
    }
}

impl From<reqwest::Error> for ReviewApiError {
    fn from(err: reqwest::Error) -> Self {
        ReviewApiError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ReviewApiError {
    fn from(err: serde_json::Error) -> Self {
        ReviewApiError::Parse(err.to_string())
    }
}
