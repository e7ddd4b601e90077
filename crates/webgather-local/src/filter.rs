//! Allow-list based host filtering for fetch targets.
//!
//! This is a pure predicate: no IO, no state beyond the configured list.

/// Default allow-list: trusted suffixes plus named health/education
/// organizations. Callers can replace this wholesale via
/// [`DomainFilter::new`].
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "gov",
    "edu",
    "who.int",
    "nih.gov",
    "cdc.gov",
    "medlineplus.gov",
    "mayoclinic.org",
    "clevelandclinic.org",
    "healthline.com",
    "webmd.com",
    "autismspeaks.org",
    "understood.org",
];

#[derive(Debug, Clone)]
pub struct DomainFilter {
    enabled: bool,
    allowed: Vec<String>,
}

impl DomainFilter {
    pub fn new(enabled: bool, allowed: Vec<String>) -> Self {
        Self { enabled, allowed }
    }

    /// Filtering enabled with the default allow-list.
    pub fn with_defaults() -> Self {
        Self::new(
            true,
            DEFAULT_ALLOWED_DOMAINS.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// A filter that admits every syntactically valid URL.
    pub fn disabled() -> Self {
        Self::new(false, Vec::new())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether `url`'s host is eligible for fetching.
    ///
    /// A URL that fails to parse is disallowed (fails closed) when filtering
    /// is on. Matching is case-insensitive and bidirectional-substring, so
    /// `gov` admits `example.gov` and `cdc.gov` admits `www.cdc.gov`.
    pub fn allowed(&self, url: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(host) = host_of(url) else {
            tracing::debug!(url, "url failed to parse; blocked by domain filter");
            return false;
        };
        for entry in &self.allowed {
            let entry = entry.trim().to_ascii_lowercase();
            if entry.is_empty() {
                continue;
            }
            if host.contains(&entry) || entry.contains(&host) {
                return true;
            }
        }
        tracing::debug!(url, host, "url blocked by domain filter");
        false
    }
}

/// Lowercased host with any leading `www.` removed, or None for unparseable
/// or host-less URLs.
fn host_of(url: &str) -> Option<String> {
    let u = url::Url::parse(url.trim()).ok()?;
    let host = u.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        return None;
    }
    Some(host.to_string())
}
