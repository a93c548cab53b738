//! Fetching trending pages from upstream

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use trendwatch_common::{Language, Period};

pub const DEFAULT_BASE_URL: &str = "https://github.com";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },

    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: reqwest::StatusCode },
}

/// Where refreshes get their markup from.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Raw markup of the trending page for `lang` over `period`.
    async fn fetch_page(&self, lang: &Language, period: Period) -> Result<String, FetchError>;
}

/// [`PageSource`] backed by HTTP GETs against a trending site.
pub struct TrendingClient {
    client: Client,
    base_url: String,
}

impl TrendingClient {
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `<base>/trending/<query>?since=<period>`
    pub fn page_url(&self, lang: &Language, period: Period) -> String {
        format!("{}/trending/{}?since={}", self.base_url, lang.query_key, period)
    }
}

#[async_trait]
impl PageSource for TrendingClient {
    async fn fetch_page(&self, lang: &Language, period: Period) -> Result<String, FetchError> {
        let url = self.page_url(lang, period);
        tracing::debug!("Fetching trending page {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Request { url: url.clone(), source })?;

        if !response.status().is_success() {
            return Err(FetchError::Status { url, status: response.status() });
        }

        response
            .text()
            .await
            .map_err(|source| FetchError::Request { url, source })
    }
}
