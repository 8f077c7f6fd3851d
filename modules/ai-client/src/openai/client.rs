use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::debug;

use super::types::{ChatRequest, ChatResponse};
use crate::util::truncate_to_char_boundary;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Upper bound for one completion call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Bytes of an error body kept in the returned error.
const MAX_ERROR_BODY: usize = 1000;

pub(crate) struct OpenAiClient {
    api_key: String,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.to_string(),
            http,
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .context("API key is not a valid header value")?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{OPENAI_API_URL}/chat/completions");
        debug!(model = %request.model, messages = request.messages.len(), "OpenAI chat request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = truncate_to_char_boundary(&body, MAX_ERROR_BODY);
            match status {
                StatusCode::TOO_MANY_REQUESTS => bail!("OpenAI rate limit exceeded (429): {body}"),
                StatusCode::UNAUTHORIZED => bail!("OpenAI rejected the API key (401)"),
                _ => return Err(anyhow!("OpenAI API error ({status}): {body}")),
            }
        }

        response
            .json()
            .await
            .context("OpenAI response did not match the chat completion shape")
    }
}
