pub mod error;
pub mod retry;
pub mod types;

pub use error::{Result, ReviewApiError};
pub use retry::{cancellable_sleep, retry_with_backoff, RetryPolicy};
pub use types::{parse_api_date, PageQuery, RawReview, ReviewPage, ReviewUser};

use reqwest::StatusCode;
use types::REVIEW_FIELDS;

pub const DEFAULT_BASE_URL: &str = "https://www.holidaycheck.de/svc/api-hotelreview/v3";
pub const DEFAULT_LOCALE: &str = "de";

/// Header carrying the tenant-scoped partner credential.
const PARTNER_HEADER: &str = "Partner-ID";

pub struct ReviewApiClient {
    client: reqwest::Client,
    base_url: String,
    locale: String,
}

impl ReviewApiClient {
    pub fn new(base_url: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            locale: locale.into(),
        }
    }

    /// Fetch one page of reviews for an entity, newest entries first.
    ///
    /// HTTP 429 maps to [`ReviewApiError::RateLimited`]; any other non-2xx
    /// status maps to [`ReviewApiError::Api`].
    pub async fn fetch_page(&self, query: &PageQuery) -> Result<ReviewPage> {
        let url = format!("{}/hotelreview", self.base_url);
        let filter = format!("hotel.id:{}", query.entity_id);
        let limit = query.limit.to_string();
        let offset = query.offset.to_string();

        tracing::debug!(entity_id = %query.entity_id, offset = query.offset, limit = query.limit, "Fetching review page");

        let resp = self
            .client
            .get(&url)
            .header(PARTNER_HEADER, &query.partner_id)
            .query(&[
                ("select", REVIEW_FIELDS),
                ("filter", filter.as_str()),
                ("sort", "entryDate:desc"),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
                ("locale", self.locale.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ReviewApiError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ReviewApiError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let page: ReviewPage = serde_json::from_str(&body)?;
        Ok(page)
    }
}
