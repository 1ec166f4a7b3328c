//! Turning a [`Source`] into plain text.
//!
//! [`SourceExtractor`] handles the formats the pipeline accepts out of the box:
//!
//! - PDF files (feature `pdf`), parsed off the async runtime;
//! - any other file, decoded as UTF-8 with invalid sequences replaced;
//! - `http(s)` URLs (feature `web`), fetched and stripped of markup.
//!
//! A source kind whose feature is compiled out is rejected with
//! [`RagError::InvalidInput`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{RagError, Result};
use crate::source::Source;

/// Browser User-Agent sent with page fetches; some sites refuse bare clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; docqa/0.1)";

/// Default timeout for a page fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Produces the raw text of a source.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract text from `source`. An empty string is a valid result; the
    /// pipeline decides what to do with it.
    async fn extract(&self, source: &Source) -> Result<String>;
}

/// The default extractor for files and web pages.
#[derive(Debug, Clone)]
pub struct SourceExtractor {
    #[cfg_attr(not(feature = "web"), allow(dead_code))]
    user_agent: String,
    #[cfg_attr(not(feature = "web"), allow(dead_code))]
    timeout: Duration,
    #[cfg(feature = "web")]
    client: reqwest::Client,
}

impl Default for SourceExtractor {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            #[cfg(feature = "web")]
            client: reqwest::Client::new(),
        }
    }
}

impl SourceExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[cfg(feature = "pdf")]
    async fn extract_pdf(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let bytes = bytes.to_vec();
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| RagError::Extraction(format!("PDF parser for '{name}' aborted: {e}")))?
            .map_err(|e| RagError::Extraction(format!("failed to parse PDF '{name}': {e}")))?;

        if text.trim().is_empty() {
            warn!(source = name, "PDF contains no extractable text");
        }
        Ok(text)
    }

    #[cfg(not(feature = "pdf"))]
    async fn extract_pdf(&self, name: &str, _bytes: &[u8]) -> Result<String> {
        Err(RagError::InvalidInput(format!(
            "'{name}' is a PDF but PDF support is not enabled in this build"
        )))
    }

    #[cfg(feature = "web")]
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(url, error = %e, "page fetch failed");
                RagError::NoTextExtracted(format!("could not fetch {url}: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, %status, "page fetch returned an error status");
            return Err(RagError::NoTextExtracted(format!("{url} returned {status}")));
        }

        let html = response.text().await.map_err(|e| {
            RagError::Extraction(format!("could not decode response body from {url}: {e}"))
        })?;
        Ok(html_to_text(&html))
    }

    #[cfg(not(feature = "web"))]
    async fn fetch_page(&self, url: &str) -> Result<String> {
        Err(RagError::InvalidInput(format!(
            "cannot fetch {url}: web support is not enabled in this build"
        )))
    }
}

#[async_trait]
impl TextExtractor for SourceExtractor {
    async fn extract(&self, source: &Source) -> Result<String> {
        let text = match source {
            Source::File { name, bytes } if source.is_pdf() => {
                self.extract_pdf(name, bytes).await?
            }
            Source::File { bytes, .. } => String::from_utf8_lossy(bytes).into_owned(),
            Source::Url(url) => self.fetch_page(url).await?,
        };
        debug!(source = source.name(), text_len = text.len(), "extracted text");
        Ok(text)
    }
}

#[cfg(feature = "web")]
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript"];

/// Visible text of an HTML document.
///
/// Text inside `<script>`, `<style>` and `<noscript>` is dropped. The remaining
/// text nodes are trimmed and joined with single spaces.
#[cfg(feature = "web")]
pub fn html_to_text(html: &str) -> String {
    use scraper::{ElementRef, Html, Node};

    let document = Html::parse_document(html);
    let mut parts = Vec::new();
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|el| SKIPPED_ELEMENTS.contains(&el.value().name()));
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
    }
    parts.join(" ")
}
