use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("extract failed: {0}")]
    Extract(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    /// How many results the provider should return (providers may cap this).
    pub max_results: Option<usize>,
    /// Timeout for the provider request (network + parsing).
    pub timeout_ms: Option<u64>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: None,
            timeout_ms: None,
        }
    }
}

/// One search hit as reported by a provider, before any fetching.
///
/// All fields are always present; providers fill absent payload fields with
/// empty strings so downstream stages never deal with missing keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawSearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
    /// Human-readable provider name (e.g. "Google Custom Search").
    pub source: String,
}

/// A titled text document ready for inclusion as LLM context.
///
/// Invariant: `contents` is never empty or whitespace-only. A result whose
/// page yielded no extractable text is backed by its search snippet instead,
/// or dropped before this type is ever constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub title: String,
    pub contents: String,
    pub url: String,
    /// The search query that surfaced this document.
    pub query: String,
    pub source: String,
    /// Length of `contents` in characters.
    pub content_length: usize,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one query against this provider.
    ///
    /// An empty result list is a valid response; callers treat it the same
    /// as an error (fall through to the next provider).
    async fn search(&self, q: &SearchQuery) -> Result<Vec<RawSearchResult>>;
}

/// Text-generation capability supplied by the caller (the chat subsystem).
///
/// The pipeline uses it only for query expansion and has no knowledge of
/// which model serves it.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}
