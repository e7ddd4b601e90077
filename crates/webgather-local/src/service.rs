//! The search-and-extract pipeline: expand a prompt into queries, fan the
//! queries out across providers, fetch and extract the results under a
//! shared concurrency bound and a run-level deadline.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use webgather_core::{ExtractedDocument, RawSearchResult, Result, SearchProvider, SearchQuery, TextGenerator};

use crate::expand;
use crate::extract::{ContentExtractor, BROWSER_USER_AGENT};
use crate::filter::DomainFilter;
use crate::search::{GoogleSearchProvider, SerpApiProvider};

const DEFAULT_MAX_BODY_BYTES: u64 = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    /// How many search queries to expand the prompt into.
    pub num_search_queries: usize,
    /// How many results to request from a provider per query.
    pub num_results_per_query: usize,
    /// Timeout for each individual HTTP request (search or fetch).
    pub request_timeout: Duration,
    /// Deadline for the whole run; `None` means twice `request_timeout`.
    pub overall_timeout: Option<Duration>,
    /// Ceiling on concurrently in-flight HTTP requests.
    pub max_concurrent_requests: usize,
    /// Ceiling on bytes read from any fetched body.
    pub max_body_bytes: u64,
    pub domain_filter: DomainFilter,
    /// Credentials; a provider with missing credentials is simply not built.
    pub google_api_key: Option<String>,
    pub google_engine_id: Option<String>,
    pub serpapi_key: Option<String>,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            num_search_queries: 3,
            num_results_per_query: 3,
            request_timeout: Duration::from_secs(10),
            overall_timeout: None,
            max_concurrent_requests: 10,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            domain_filter: DomainFilter::with_defaults(),
            google_api_key: None,
            google_engine_id: None,
            serpapi_key: None,
        }
    }
}

impl WebSearchConfig {
    /// Defaults plus credentials read from the environment.
    pub fn from_env() -> Self {
        Self {
            google_api_key: crate::search::google_api_key_from_env(),
            google_engine_id: crate::search::google_engine_id_from_env(),
            serpapi_key: crate::search::serpapi_key_from_env(),
            ..Self::default()
        }
    }

    fn overall_timeout(&self) -> Duration {
        self.overall_timeout.unwrap_or(self.request_timeout * 2)
    }
}

pub struct WebSearchService {
    config: WebSearchConfig,
    providers: Vec<Arc<dyn SearchProvider>>,
    extractor: ContentExtractor,
    semaphore: Arc<Semaphore>,
}

impl WebSearchService {
    pub fn new(config: WebSearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| webgather_core::Error::Fetch(e.to_string()))?;

        // Priority order: Google first, SerpAPI as the fallback.
        let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();
        if let (Some(key), Some(cx)) = (&config.google_api_key, &config.google_engine_id) {
            providers.push(Arc::new(GoogleSearchProvider::new(
                client.clone(),
                key.clone(),
                cx.clone(),
            )));
        }
        if let Some(key) = &config.serpapi_key {
            providers.push(Arc::new(SerpApiProvider::new(client.clone(), key.clone())));
        }
        if providers.is_empty() {
            tracing::warn!("no search providers configured, searches will return nothing");
        }

        let extractor =
            ContentExtractor::new(client, config.request_timeout, config.max_body_bytes);
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));

        Ok(Self {
            config,
            providers,
            extractor,
            semaphore,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(WebSearchConfig::from_env())
    }

    /// Replace the provider chain (priority order). Used to inject providers
    /// with overridden endpoints.
    pub fn with_providers(mut self, providers: Vec<Arc<dyn SearchProvider>>) -> Self {
        self.providers = providers;
        self
    }

    /// Expand `prompt` into queries, search each one, then fetch and extract
    /// every allowed result.
    ///
    /// Individual failures (a provider outage, an unreachable page, an
    /// unparseable body) cost only their own result. The run-level deadline
    /// bounds the whole call; work still in flight when it expires is
    /// abandoned and whatever finished is returned.
    pub async fn search_and_extract(
        &self,
        prompt: &str,
        generator: &dyn TextGenerator,
    ) -> Vec<ExtractedDocument> {
        if self.providers.is_empty() {
            return Vec::new();
        }
        let deadline = tokio::time::Instant::now() + self.config.overall_timeout();

        let queries = expand::expand(prompt, self.config.num_search_queries, generator).await;

        let mut search_tasks: JoinSet<(String, Vec<RawSearchResult>)> = JoinSet::new();
        for query in queries {
            let providers = self.providers.clone();
            let semaphore = self.semaphore.clone();
            let q = SearchQuery {
                query: query.clone(),
                max_results: Some(self.config.num_results_per_query),
                timeout_ms: Some(self.config.request_timeout.as_millis() as u64),
            };
            search_tasks.spawn(async move {
                let results = crate::search::search_with_fallback(&providers, &semaphore, &q).await;
                (query, results)
            });
        }

        let mut found: Vec<(String, RawSearchResult)> = Vec::new();
        for (query, results) in drain_with_deadline(&mut search_tasks, deadline, "search").await {
            if results.is_empty() {
                tracing::debug!(query = %query, "no search results");
                continue;
            }
            for r in results {
                found.push((query.clone(), r));
            }
        }

        let mut extract_tasks: JoinSet<Option<ExtractedDocument>> = JoinSet::new();
        for (query, result) in found {
            if self.config.domain_filter.is_enabled()
                && !self.config.domain_filter.allowed(&result.url)
            {
                continue;
            }
            let extractor = self.extractor.clone();
            let semaphore = self.semaphore.clone();
            extract_tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                let contents = match extractor.extract(&result.url).await {
                    Some(text) => text,
                    None => {
                        // A provider snippet still beats returning nothing.
                        let snippet = result.snippet.trim();
                        if snippet.is_empty() {
                            tracing::debug!(url = %result.url, "no content and no snippet, dropping");
                            return None;
                        }
                        snippet.to_string()
                    }
                };
                let title = match result.title.trim() {
                    "" => "Untitled".to_string(),
                    t => t.to_string(),
                };
                let content_length = contents.chars().count();
                Some(ExtractedDocument {
                    title,
                    contents,
                    url: result.url,
                    query,
                    source: result.source,
                    content_length,
                })
            });
        }

        let docs: Vec<ExtractedDocument> =
            drain_with_deadline(&mut extract_tasks, deadline, "extract")
                .await
                .into_iter()
                .flatten()
                .collect();
        tracing::info!(count = docs.len(), "search and extract finished");
        docs
    }
}

/// Collect task outputs until the set is empty or `deadline` passes.
/// On expiry the remaining tasks are aborted and the partials kept.
async fn drain_with_deadline<T: 'static>(
    set: &mut JoinSet<T>,
    deadline: tokio::time::Instant,
    stage: &'static str,
) -> Vec<T> {
    let mut out = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, set.join_next()).await {
            Ok(Some(Ok(v))) => out.push(v),
            Ok(Some(Err(e))) => {
                if e.is_panic() {
                    tracing::warn!(stage, "task panicked: {e}");
                }
            }
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(
                    stage,
                    abandoned = set.len(),
                    "deadline reached, returning partial results"
                );
                set.abort_all();
                break;
            }
        }
    }
    out
}
