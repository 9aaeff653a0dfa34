//! Language backend over the Gemini `generateContent` API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use scout_core::backend::{complete_with_retry, LanguageBackend};
use scout_core::config::{ApiKeysConfig, BackendConfig};
use scout_core::gateway::RetryPolicy;
use scout_core::{BackendError, Result, ScoutError};

use crate::protocol::{GenerateContentRequest, GenerateContentResponse};
use crate::serper::summarize;

pub struct GeminiBackend {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    retry: RetryPolicy,
}

impl GeminiBackend {
    pub fn new(keys: &ApiKeysConfig, config: &BackendConfig) -> Result<Self> {
        let api_key = keys.gemini.trim();
        if api_key.is_empty() {
            return Err(ScoutError::Config(
                "Gemini API key is missing (set api_keys.gemini or GEMINI_API_KEY)".into(),
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|_| Client::new());
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.to_string(),
            retry: RetryPolicy::from(config),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }

    /// One `generateContent` round trip, no retry.
    async fn generate(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        let req = GenerateContentRequest::json_prompt(prompt);
        let resp = self
            .client
            .post(self.url())
            .query(&[("key", &self.api_key)])
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout
                } else {
                    BackendError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        let text = body
            .first_text()
            .ok_or_else(|| BackendError::InvalidResponse("no candidate text in reply".into()))?;
        debug!("Backend replied with {} chars", text.len());
        Ok(text)
    }
}

#[async_trait]
impl LanguageBackend for GeminiBackend {
    /// Overloaded (5xx), throttled and timed-out calls are retried on the
    /// `[backend]` schedule before the error reaches the analyzer.
    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn complete(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        complete_with_retry(&self.retry, || self.generate(prompt)).await
    }

    fn name(&self) -> &str {
        &self.model
    }
}

fn status_error(status: StatusCode, body: &str) -> BackendError {
    let message = summarize(body, status);
    match status.as_u16() {
        401 | 403 => BackendError::Unauthorized(message),
        429 => BackendError::RateLimited,
        code => BackendError::Server {
            status: code,
            message,
        },
    }
}
