//! Local (reqwest-backed) implementations for webgather.
//!
//! This crate holds everything that touches the network: the search
//! provider adapters, the content fetcher/extractor, the query expander,
//! the domain allow-list, and the orchestrating [`WebSearchService`].
//! Shared types and traits live in `webgather-core`.

pub mod expand;
pub mod extract;
pub mod filter;
pub mod search;
pub mod service;

pub use extract::{ContentExtractor, BROWSER_USER_AGENT};
pub use filter::{DomainFilter, DEFAULT_ALLOWED_DOMAINS};
pub use search::{search_with_fallback, GoogleSearchProvider, SerpApiProvider};
pub use service::{WebSearchConfig, WebSearchService};
