//! Firecrawl-backed search, map, and fetch providers.
//!
//! One [`FirecrawlClient`] implements all three provider traits against the
//! Firecrawl v1 API:
//!
//! | Endpoint | Trait |
//! |----------|-------|
//! | `POST /v1/search` | [`SearchProvider`] |
//! | `POST /v1/map` | [`MapProvider`] |
//! | `POST /v1/scrape` | [`FetchProvider`] |
//!
//! Responses are parsed defensively from `serde_json::Value` — the API has
//! shipped both `{url}` strings and `{url, title}` objects in `links`.
//!
//! # Retry strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, ... (capped at 2^5)

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::FirecrawlConfig;
use crate::error::{HarnessError, Result};
use crate::providers::{FetchProvider, FetchedPage, MapProvider, SearchHit, SearchProvider};

const API_BASE: &str = "https://api.firecrawl.dev/v1";

pub struct FirecrawlClient {
    client: reqwest::Client,
    api_key: String,
    max_retries: u32,
}

impl FirecrawlClient {
    /// Build a client. The API key is taken eagerly so a missing credential
    /// fails before any network call.
    pub fn new(config: &FirecrawlConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            max_retries: config.max_retries,
        })
    }

    /// POST a JSON body with retry/backoff, returning the parsed response.
    async fn post(&self, op: &'static str, endpoint: &str, body: Value) -> Result<Value> {
        let url = format!("{}/{}", API_BASE, endpoint);
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<Value>().await.map_err(|e| {
                            HarnessError::Provider {
                                op,
                                message: format!("invalid JSON response: {}", e),
                            }
                        });
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(format!("HTTP {}: {}", status, body_text));
                        continue;
                    }
                    return Err(HarnessError::Provider {
                        op,
                        message: format!("HTTP {}: {}", status, body_text),
                    });
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(HarnessError::Provider {
            op,
            message: last_err.unwrap_or_else(|| "request failed after retries".into()),
        })
    }
}

#[async_trait]
impl SearchProvider for FirecrawlClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let body = json!({ "query": query, "limit": limit });
        let response = self.post("search", "search", body).await?;
        Ok(parse_search_response(&response))
    }
}

#[async_trait]
impl MapProvider for FirecrawlClient {
    async fn map(&self, seed_url: &str, limit: usize) -> Result<Vec<String>> {
        let body = json!({ "url": seed_url, "limit": limit });
        let response = self.post("map", "map", body).await?;
        Ok(parse_map_response(&response))
    }
}

#[async_trait]
impl FetchProvider for FirecrawlClient {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let body = json!({ "url": url, "formats": ["markdown"] });
        let response = self
            .post("scrape", "scrape", body)
            .await
            .map_err(|e| HarnessError::Fetch {
                url: url.to_string(),
                cause: e.to_string(),
            })?;

        let data = response.get("data").unwrap_or(&response);
        let content = data
            .get("markdown")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| HarnessError::Fetch {
                url: url.to_string(),
                cause: "scrape returned no markdown content".into(),
            })?;
        let title = data
            .get("metadata")
            .and_then(|m| m.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(FetchedPage { content, title })
    }
}

/// Extract search hits from either `{data: [..]}` or `{web: [..]}` shapes.
fn parse_search_response(response: &Value) -> Vec<SearchHit> {
    let rows = response
        .get("data")
        .or_else(|| response.get("web"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    rows.iter()
        .filter_map(|row| {
            let url = row.get("url").and_then(Value::as_str)?;
            Some(SearchHit {
                url: url.to_string(),
                title: row.get("title").and_then(Value::as_str).map(str::to_string),
                snippet: row
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect()
}

/// Extract URLs from a map response; `links` entries may be plain strings or
/// `{url, title}` objects.
fn parse_map_response(response: &Value) -> Vec<String> {
    let links = response
        .get("links")
        .or_else(|| response.get("data").and_then(|d| d.get("links")))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    links
        .iter()
        .filter_map(|link| match link {
            Value::String(s) => Some(s.clone()),
            Value::Object(_) => link
                .get("url")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}
