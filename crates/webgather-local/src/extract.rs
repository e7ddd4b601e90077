//! Fetching and content-type-aware text extraction.
//!
//! The extractor returns `Option<String>`: "nothing" is the normal outcome
//! for unsupported types, HTTP errors, parse failures, and pages that clean
//! down to empty. None of those abort the pipeline.

use futures_util::StreamExt;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Document types we cannot turn into text; rejected before any request.
const SKIP_EXTENSIONS: &[&str] = &[
    ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".rar",
];

/// Non-content elements removed before any HTML extraction.
const STRIP_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "meta", "link", "noscript", "iframe",
];

/// Content-area selectors, tried in order of preference.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=\"main\"]",
    ".content",
    "#content",
    ".post-content",
    ".entry-content",
    ".article-content",
    ".article-body",
    ".story-body",
    ".post-body",
];

/// Noise regions removed from the body-text fallback.
const NOISE_CLASSES: &[&str] = &[
    "advertisement",
    "ads",
    "social-share",
    "comments",
    "related-articles",
    "sidebar",
    "menu",
    "navigation",
];

/// Phrases stripped from cleaned text (matched case-insensitively after
/// whitespace collapsing).
const BOILERPLATE_PHRASES: &[&str] = &[
    "cookie policy",
    "privacy policy",
    "terms of service",
    "skip to main content",
    "skip to content",
    "advertisement",
];

/// An element whose text is shorter than this is not substantial content.
const MIN_CONTENT_CHARS: usize = 100;
/// Below this total, the selector ladder is abandoned for the body fallback.
const MIN_LADDER_CHARS: usize = 200;

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn content_type_lc_prefix(ct: Option<&str>) -> String {
    ct.unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Best-effort sniff for PDF bytes (magic header).
pub fn bytes_look_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

pub fn has_unsupported_extension(url: &str) -> bool {
    let path = url::Url::parse(url.trim())
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_else(|_| url.trim().to_ascii_lowercase());
    SKIP_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn is_noise_element(el: &ElementRef) -> bool {
    el.value()
        .classes()
        .any(|c| NOISE_CLASSES.iter().any(|n| c.eq_ignore_ascii_case(n)))
}

/// Descendant text of `el`, skipping stripped tags (and, for the body
/// fallback, noise-class containers).
fn collect_text(el: ElementRef, skip_noise: bool, out: &mut String) {
    for child in el.children() {
        if let Some(t) = child.value().as_text() {
            out.push_str(&t.text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if STRIP_TAGS.contains(&child_el.value().name()) {
                continue;
            }
            if skip_noise && is_noise_element(&child_el) {
                continue;
            }
            collect_text(child_el, skip_noise, out);
        }
    }
}

/// Extract readable text from an HTML document.
///
/// Tries the content-area selector ladder first, accepting only substantial
/// matches; short or empty ladder output falls back to the whole body with
/// noise regions removed.
pub fn extract_html(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    let mut content = String::new();
    for sel_str in CONTENT_SELECTORS {
        let Ok(sel) = Selector::parse(sel_str) else {
            continue;
        };
        let mut texts: Vec<String> = Vec::new();
        for el in doc.select(&sel) {
            let mut raw = String::new();
            collect_text(el, false, &mut raw);
            let t = norm_ws(&raw);
            if t.chars().count() > MIN_CONTENT_CHARS {
                texts.push(t);
            }
        }
        if !texts.is_empty() {
            content = texts.join(" ");
            break;
        }
    }

    if content.chars().count() < MIN_LADDER_CHARS {
        if let Ok(sel) = Selector::parse("body") {
            if let Some(body) = doc.select(&sel).next() {
                let mut raw = String::new();
                collect_text(body, true, &mut raw);
                content = norm_ws(&raw);
            }
        }
    }

    clean_text(&content)
}

fn extract_pdf(bytes: &[u8]) -> Option<String> {
    match pdf_extract::extract_text_from_mem(bytes) {
        Ok(text) => clean_text(&text),
        Err(e) => {
            tracing::warn!("pdf extraction failed: {e}");
            None
        }
    }
}

/// Dispatch on the declared content type (or PDF heuristics) and extract.
///
/// Separated from fetching so it is unit-testable without a server.
pub fn extract_from_body(url: &str, content_type: Option<&str>, bytes: &[u8]) -> Option<String> {
    let ct = content_type_lc_prefix(content_type);
    let url_lc = url.to_ascii_lowercase();

    // The URL heuristic mirrors how PDFs are commonly served with missing
    // or wrong content types; the magic-header sniff covers the rest.
    if ct == "application/pdf" || url_lc.contains("pdf") || bytes_look_like_pdf(bytes) {
        return extract_pdf(bytes);
    }
    if ct == "text/html" || ct.is_empty() {
        return extract_html(&String::from_utf8_lossy(bytes));
    }
    if ct == "text/plain" {
        return clean_text(&String::from_utf8_lossy(bytes));
    }

    tracing::debug!(url, content_type = %ct, "unsupported content type");
    None
}

fn remove_phrase_ci(text: &str, phrase: &str) -> String {
    // ASCII lowercasing preserves byte offsets, so indexes into the
    // lowered copy are valid in the original.
    let needle = phrase.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let hay = rest.to_ascii_lowercase();
        match hay.find(&needle) {
            Some(i) => {
                out.push_str(&rest[..i]);
                rest = &rest[i + needle.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

/// Fraction of words (length > 3) that are repeats of an earlier word.
///
/// Diagnostic only: highly repetitive pages get a debug log entry but are
/// never discarded on this signal.
pub fn repeated_word_fraction(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= 10 {
        return 0.0;
    }
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut total = 0usize;
    for w in &words {
        if w.chars().count() > 3 {
            total += 1;
            *counts.entry(w.to_lowercase()).or_default() += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    let repeated: usize = counts.values().filter(|&&c| c > 1).map(|c| c - 1).sum();
    repeated as f64 / total as f64
}

/// Normalize extracted text: collapse whitespace, strip boilerplate
/// phrases, and return None rather than anything empty.
pub fn clean_text(text: &str) -> Option<String> {
    let collapsed = norm_ws(text);
    if collapsed.is_empty() {
        return None;
    }
    let mut cleaned = collapsed;
    for phrase in BOILERPLATE_PHRASES {
        cleaned = remove_phrase_ci(&cleaned, phrase);
    }
    let cleaned = norm_ws(&cleaned);
    if cleaned.is_empty() {
        return None;
    }
    let repetition = repeated_word_fraction(&cleaned);
    if repetition > 0.3 {
        tracing::debug!(repetition, "content appears highly repetitive, may be low quality");
    }
    Some(cleaned)
}

#[derive(Debug, Clone)]
pub struct ContentExtractor {
    client: reqwest::Client,
    request_timeout: Duration,
    max_body_bytes: u64,
}

impl ContentExtractor {
    pub fn new(client: reqwest::Client, request_timeout: Duration, max_body_bytes: u64) -> Self {
        Self {
            client,
            request_timeout,
            max_body_bytes,
        }
    }

    /// Fetch `url` and extract cleaned text from it.
    ///
    /// Every failure mode (unsupported type, request error, non-2xx status,
    /// parse failure, empty-after-cleaning) yields None, never an error.
    pub async fn extract(&self, url: &str) -> Option<String> {
        if has_unsupported_extension(url) {
            tracing::debug!(url, "skipping unsupported file type");
            return None;
        }

        let resp = match self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .timeout(self.request_timeout)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(url, "fetch failed: {e}");
                return None;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(url, status = status.as_u16(), "non-success status");
            return None;
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        // Bounded body read: a hostile or broken server must not be able to
        // buffer unbounded bytes into the pipeline.
        let mut bytes: Vec<u8> = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    tracing::debug!(url, "body read failed: {e}");
                    return None;
                }
            };
            if (bytes.len().saturating_add(chunk.len())) as u64 > self.max_body_bytes {
                let can_take = (self.max_body_bytes as usize).saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                tracing::debug!(url, max = self.max_body_bytes, "body truncated");
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        extract_from_body(url, content_type.as_deref(), &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn clean_text_collapses_whitespace_and_trims() {
        assert_eq!(
            clean_text("  hello \n\t world  ").as_deref(),
            Some("hello world")
        );
    }

    #[test]
    fn clean_text_strips_boilerplate_case_insensitively() {
        let out = clean_text("Read this. Cookie Policy ADVERTISEMENT Skip to main content done")
            .unwrap();
        assert_eq!(out, "Read this. done");
    }

    #[test]
    fn clean_text_returns_none_for_empty_or_boilerplate_only_input() {
        assert_eq!(clean_text(""), None);
        assert_eq!(clean_text("   \n\t  "), None);
        assert_eq!(clean_text("Privacy Policy advertisement"), None);
    }

    #[test]
    fn repetition_heuristic_flags_but_never_discards() {
        let repetitive = "sponsored sponsored sponsored sponsored sponsored sponsored \
                          sponsored sponsored sponsored sponsored sponsored sponsored";
        assert!(repeated_word_fraction(repetitive) > 0.3);
        // Advisory only: the content still comes through.
        assert!(clean_text(repetitive).is_some());
    }

    #[test]
    fn repetition_heuristic_ignores_short_texts_and_short_words() {
        assert_eq!(repeated_word_fraction("a a a a a"), 0.0);
        assert_eq!(repeated_word_fraction("one two three"), 0.0);
    }

    #[test]
    fn unsupported_extensions_are_rejected() {
        assert!(has_unsupported_extension("https://example.gov/report.docx"));
        assert!(has_unsupported_extension("https://example.gov/archive.ZIP"));
        assert!(has_unsupported_extension(
            "https://example.gov/slides.pptx?utm_source=x"
        ));
        assert!(!has_unsupported_extension("https://example.gov/report.pdf"));
        assert!(!has_unsupported_extension("https://example.gov/page.html"));
    }

    #[test]
    fn bytes_look_like_pdf_sniffs_magic_header() {
        assert!(bytes_look_like_pdf(b"%PDF-1.7\n..."));
        assert!(!bytes_look_like_pdf(b"<!doctype html>"));
        assert!(!bytes_look_like_pdf(b""));
    }

    fn article_html() -> String {
        let body: String = "This is substantial article text about the topic at hand. "
            .repeat(6);
        format!(
            r#"<html><head><title>T</title><script>var x = "ignore me";</script></head>
            <body>
              <nav><a href="/x">Home</a><a href="/y">About</a></nav>
              <article><h2>Guidelines</h2><p>{body}</p></article>
              <footer>Copyright, Privacy Policy links, misc</footer>
            </body></html>"#
        )
    }

    #[test]
    fn html_extraction_prefers_the_article_selector() {
        let out = extract_html(&article_html()).unwrap();
        assert!(out.contains("substantial article text"));
        assert!(!out.contains("Home"));
        assert!(!out.contains("Copyright"));
        assert!(!out.contains("ignore me"));
    }

    #[test]
    fn html_extraction_falls_back_to_body_with_noise_removed() {
        let body: String = "Body level paragraph content that is long enough to keep. ".repeat(8);
        let html = format!(
            r#"<html><body>
              <div class="sidebar">sidebar junk</div>
              <div class="ads">buy things</div>
              <p>{body}</p>
            </body></html>"#
        );
        let out = extract_html(&html).unwrap();
        assert!(out.contains("Body level paragraph content"));
        assert!(!out.contains("sidebar junk"));
        assert!(!out.contains("buy things"));
    }

    #[test]
    fn html_extraction_yields_none_for_script_only_pages() {
        let html = r#"<html><body><script>render()</script></body></html>"#;
        assert_eq!(extract_html(html), None);
    }

    #[test]
    fn dispatch_uses_html_path_for_declared_html() {
        let out = extract_from_body(
            "https://example.gov/page",
            Some("text/html; charset=utf-8"),
            article_html().as_bytes(),
        );
        assert!(out.unwrap().contains("substantial article text"));
    }

    #[test]
    fn dispatch_treats_missing_content_type_as_html() {
        let out = extract_from_body("https://example.gov/page", None, article_html().as_bytes());
        assert!(out.unwrap().contains("substantial article text"));
    }

    #[test]
    fn dispatch_uses_pdf_path_for_declared_pdf_regardless_of_body() {
        // Declared PDF but HTML bytes: the PDF parser fails, which must
        // yield None rather than falling through to the HTML path.
        let out = extract_from_body(
            "https://example.gov/page",
            Some("application/pdf"),
            article_html().as_bytes(),
        );
        assert_eq!(out, None);
    }

    #[test]
    fn dispatch_cleans_plain_text_as_is() {
        let out = extract_from_body(
            "https://example.gov/notes",
            Some("text/plain"),
            b"  plain   text body  ",
        );
        assert_eq!(out.as_deref(), Some("plain text body"));
    }

    #[test]
    fn dispatch_rejects_other_content_types() {
        let out = extract_from_body(
            "https://example.gov/logo",
            Some("image/png"),
            b"\x89PNG\r\n\x1a\n",
        );
        assert_eq!(out, None);
    }

    proptest! {
        #[test]
        fn clean_text_is_never_some_empty_or_untrimmed(s in ".*") {
            if let Some(out) = clean_text(&s) {
                prop_assert!(!out.trim().is_empty());
                prop_assert_eq!(out.trim(), out.as_str());
                prop_assert!(!out.contains("  "));
            }
        }
    }
}
