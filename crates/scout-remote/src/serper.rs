//! Web search over the Serper API, restricted to GitHub.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument};

use scout_core::candidate::RawHit;
use scout_core::config::{ApiKeysConfig, SearchConfig};
use scout_core::search::{SearchQuery, SearchSurface};
use scout_core::{Result, ScoutError, SearchError};

use crate::protocol::{WebSearchRequest, WebSearchResponse};

const SITE_FILTER: &str = "site:github.com";

/// [`SearchSurface`] backed by Serper's Google search endpoint.
pub struct SerperSearch {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl SerperSearch {
    pub fn new(keys: &ApiKeysConfig, config: &SearchConfig) -> Result<Self> {
        let api_key = keys.serper.trim();
        if api_key.is_empty() {
            return Err(ScoutError::Config(
                "Serper API key is missing (set api_keys.serper or SERPER_API_KEY)".into(),
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|_| Client::new());
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl SearchSurface for SerperSearch {
    #[instrument(skip(self, query), fields(query = %query.text))]
    async fn search(&self, query: &SearchQuery) -> std::result::Result<Vec<RawHit>, SearchError> {
        let req = WebSearchRequest {
            q: site_query(&query.text),
            num: query.target_count,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, retry_after, &body));
        }

        let body: WebSearchResponse = resp
            .json()
            .await
            .map_err(|e| SearchError::Malformed(e.to_string()))?;
        debug!("Search returned {} organic results", body.organic.len());
        Ok(body.organic.into_iter().map(RawHit::from).collect())
    }

    fn name(&self) -> &str {
        "serper"
    }
}

fn site_query(text: &str) -> String {
    format!("{SITE_FILTER} {}", text.trim())
}

fn status_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> SearchError {
    let message = summarize(body, status);
    match SearchError::from_status(status.as_u16(), message) {
        SearchError::RateLimited { .. } => SearchError::RateLimited { retry_after },
        other => other,
    }
}

pub(crate) fn transport_error(err: reqwest::Error) -> SearchError {
    if err.is_timeout() {
        SearchError::Timeout
    } else if err.is_decode() {
        SearchError::Malformed(err.to_string())
    } else {
        SearchError::Network(err.to_string())
    }
}

/// Only the delta-seconds form of `Retry-After` is honoured.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

pub(crate) fn summarize(body: &str, status: StatusCode) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string();
    }
    body.chars().take(200).collect()
}
