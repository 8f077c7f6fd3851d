mod client;
pub(crate) mod types;

use anyhow::{anyhow, Result};

use client::OpenAiClient;

/// Completion budget for a single summarization turn.
const MAX_OUTPUT_TOKENS: u32 = 4096;

// =============================================================================
// OpenAi
// =============================================================================

#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    pub(crate) model: String,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn client(&self) -> OpenAiClient {
        OpenAiClient::new(&self.api_key)
    }

    /// Single-turn chat completion returning the raw assistant text.
    ///
    /// `temperature` is ignored for reasoning models, which only accept the default.
    pub async fn chat_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
        temperature: f32,
    ) -> Result<String> {
        let mut request = types::ChatRequest::new(&self.model)
            .message(types::WireMessage::system(system))
            .message(types::WireMessage::user(user));

        if types::uses_max_completion_tokens(&self.model) {
            request = request.max_completion_tokens(MAX_OUTPUT_TOKENS);
        } else {
            request = request.max_tokens(MAX_OUTPUT_TOKENS).temperature(temperature);
        }

        let response = self.client().chat(&request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("No response from OpenAI"))
    }
}
