pub mod error;
pub mod types;

pub use error::{ProPublicaError, Result};
pub use types::{
    clean_ein, format_ein, FilingWithData, OrganizationRecord, OrganizationResponse,
    OrganizationSummary, SearchQuery, SearchResponse,
};

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;

pub const DEFAULT_BASE_URL: &str = "https://projects.propublica.org/nonprofits/api/v2";

pub const DEFAULT_USER_AGENT: &str = "nonprofit-import (nonprofit research)";

pub struct ProPublicaClient {
    client: reqwest::Client,
    base_url: String,
}

impl ProPublicaClient {
    pub fn new() -> Result<Self> {
        Self::with_options(DEFAULT_BASE_URL, DEFAULT_USER_AGENT, Duration::from_secs(30))
    }

    pub fn with_options(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch one page of search results. Any non-2xx status is an `Api` error.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let url = format!("{}/search.json", self.base_url);
        tracing::debug!(page = query.page, term = ?query.term, state = ?query.state, "ProPublica search");

        let resp = self.client.get(&url).query(query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProPublicaError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch the full organization record and its filings.
    pub async fn organization(&self, ein: &str) -> Result<OrganizationResponse> {
        let digits = clean_ein(ein);
        let url = format!("{}/organizations/{}.json", self.base_url, digits);
        tracing::debug!(ein, "ProPublica organization lookup");

        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProPublicaError::NotFound(ein.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProPublicaError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}
