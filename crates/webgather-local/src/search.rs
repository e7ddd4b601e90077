//! Search provider adapters and the priority-order fallback chain.
//!
//! Providers normalize their wire shapes into [`RawSearchResult`]; every
//! failure mode (HTTP error, timeout, malformed body) is an `Error::Search`
//! that the fallback chain absorbs.

use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use webgather_core::{Error, RawSearchResult, Result, SearchProvider, SearchQuery};

pub const GOOGLE_SOURCE: &str = "Google Custom Search";
pub const SERPAPI_SOURCE: &str = "SerpAPI";

fn timeout_ms_from_query(q: &SearchQuery) -> u64 {
    // Provider requests can hang indefinitely without an explicit timeout.
    // Keep a conservative cap even if callers pass something huge.
    q.timeout_ms.unwrap_or(10_000).clamp(1_000, 60_000)
}

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn google_api_key_from_env() -> Option<String> {
    env("WEBGATHER_GOOGLE_API_KEY")
}

pub fn google_engine_id_from_env() -> Option<String> {
    env("WEBGATHER_GOOGLE_ENGINE_ID")
}

pub fn serpapi_key_from_env() -> Option<String> {
    env("WEBGATHER_SERPAPI_KEY")
}

#[derive(Debug, Clone)]
pub struct GoogleSearchProvider {
    client: reqwest::Client,
    api_key: String,
    engine_id: String,
    endpoint: String,
}

impl GoogleSearchProvider {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
    ) -> Self {
        let endpoint = env("WEBGATHER_GOOGLE_ENDPOINT")
            .unwrap_or_else(|| "https://www.googleapis.com/customsearch/v1".to_string());
        Self {
            client,
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            endpoint,
        }
    }

    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = google_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured("missing WEBGATHER_GOOGLE_API_KEY".to_string())
        })?;
        let engine_id = google_engine_id_from_env().ok_or_else(|| {
            Error::NotConfigured("missing WEBGATHER_GOOGLE_ENGINE_ID".to_string())
        })?;
        Ok(Self::new(client, api_key, engine_id))
    }

    /// Point the provider at a different endpoint (loopback servers in tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct GoogleSearchResponse {
    items: Option<Vec<GoogleItem>>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    title: Option<String>,
    snippet: Option<String>,
    link: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for GoogleSearchProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn search(&self, q: &SearchQuery) -> Result<Vec<RawSearchResult>> {
        let timeout_ms = timeout_ms_from_query(q);
        let num = q.max_results.unwrap_or(3).clamp(1, 10);

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", q.query.as_str()),
                ("num", num.to_string().as_str()),
            ])
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("google search HTTP {status}")));
        }

        let parsed: GoogleSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let mut out = Vec::new();
        for item in parsed.items.unwrap_or_default() {
            out.push(RawSearchResult {
                title: item.title.unwrap_or_default(),
                snippet: item.snippet.unwrap_or_default(),
                url: item.link.unwrap_or_default(),
                source: GOOGLE_SOURCE.to_string(),
            });
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct SerpApiProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl SerpApiProvider {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        let endpoint = env("WEBGATHER_SERPAPI_ENDPOINT")
            .unwrap_or_else(|| "https://serpapi.com/search".to_string());
        Self {
            client,
            api_key: api_key.into(),
            endpoint,
        }
    }

    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = serpapi_key_from_env()
            .ok_or_else(|| Error::NotConfigured("missing WEBGATHER_SERPAPI_KEY".to_string()))?;
        Ok(Self::new(client, api_key))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    organic_results: Option<Vec<SerpApiResult>>,
}

#[derive(Debug, Deserialize)]
struct SerpApiResult {
    title: Option<String>,
    snippet: Option<String>,
    link: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for SerpApiProvider {
    fn name(&self) -> &'static str {
        "serpapi"
    }

    async fn search(&self, q: &SearchQuery) -> Result<Vec<RawSearchResult>> {
        let timeout_ms = timeout_ms_from_query(q);
        let num = q.max_results.unwrap_or(3).clamp(1, 10);

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("engine", "google"),
                ("q", q.query.as_str()),
                ("num", num.to_string().as_str()),
            ])
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("serpapi search HTTP {status}")));
        }

        let parsed: SerpApiResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let mut out = Vec::new();
        for item in parsed.organic_results.unwrap_or_default() {
            out.push(RawSearchResult {
                title: item.title.unwrap_or_default(),
                snippet: item.snippet.unwrap_or_default(),
                url: item.link.unwrap_or_default(),
                source: SERPAPI_SOURCE.to_string(),
            });
        }
        Ok(out)
    }
}

/// Try `providers` strictly in priority order; the first non-empty result
/// list wins and later providers are not queried. Errors and empty lists
/// both fall through. All-fail is a normal outcome: an empty vec, never an
/// error.
///
/// Each provider request holds one semaphore permit, so search traffic
/// counts against the same in-flight bound as extraction traffic.
pub async fn search_with_fallback(
    providers: &[Arc<dyn SearchProvider>],
    semaphore: &Arc<Semaphore>,
    q: &SearchQuery,
) -> Vec<RawSearchResult> {
    for provider in providers {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            // Semaphore closed: shutting down, nothing more to do.
            break;
        };
        let outcome = provider.search(q).await;
        drop(permit);
        match outcome {
            Ok(results) if !results.is_empty() => return results,
            Ok(_) => {
                tracing::debug!(
                    provider = provider.name(),
                    query = %q.query,
                    "provider returned no results"
                );
            }
            Err(e) => {
                tracing::warn!(
                    provider = provider.name(),
                    query = %q.query,
                    "provider failed: {e}"
                );
            }
        }
    }
    Vec::new()
}
