//! Best-effort metadata for the blocked item.
//!
//! Resolution order: synchronous extraction from the rendered document,
//! then the public oEmbed endpoint for a missing title, then a regex scan
//! of the item's own watch-page markup for a like count. Every network or
//! parse failure is swallowed and leaves the field at its placeholder; the
//! overlay never waits on any of this.

use crate::config::EndpointsConfig;
use crate::dom::Document;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

/// Title shown until resolution (possibly forever)
pub const TITLE_PLACEHOLDER: &str = "...";

/// Like-count shown until resolution (possibly forever)
pub const LIKES_PLACEHOLDER: &str = "-";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoMetadata {
    pub title: Option<String>,
    pub like_count: Option<String>,
}

lazy_static! {
    // Embedded-JSON like-count field shapes found in watch-page markup,
    // tried in this order; the first capture wins.
    static ref LIKE_FIELD_PATTERNS: Vec<Regex> = vec![
        Regex::new(r#""likeCount"\s*:\s*"(\d[\d,]*)""#).unwrap(),
        Regex::new(r#"(?i)"label"\s*:\s*"([\d.,]+\s*[KMB]?)\s+likes?""#).unwrap(),
        Regex::new(r#""label"\s*:\s*"高評価\s*([\d.,万]+)\s*件""#).unwrap(),
    ];

    // English ARIA label on the rendered like button
    static ref LIKE_ARIA_EN: Regex =
        Regex::new(r"(?i)like this video along with ([\d.,]+) other people").unwrap();

    // Localized ARIA label
    static ref LIKE_ARIA_JA: Regex = Regex::new(r"高評価\s*([\d.,万]+)\s*件").unwrap();

    // Bare numeric-with-unit text, e.g. "1.2M" or "4.3万"
    static ref COUNT_TEXT: Regex = Regex::new(r"^[\d.,]+\s*[KMB万]?$").unwrap();
}

/// Synchronous extraction from the currently rendered page.
/// Whatever is missing stays None for the async fallbacks.
pub fn extract_from_document(doc: &Document) -> VideoMetadata {
    VideoMetadata {
        title: extract_title(doc),
        like_count: extract_like_count(doc),
    }
}

fn extract_title(doc: &Document) -> Option<String> {
    for id in doc.nodes_with_tag("title") {
        let text = doc.visible_text(id);
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            return Some(strip_site_suffix(trimmed).to_string());
        }
    }
    for id in doc.nodes_with_tag("meta") {
        let node = doc.node(id)?;
        let is_title_meta = node.attr("property") == Some("og:title")
            || node.attr("name") == Some("title");
        if is_title_meta {
            if let Some(content) = node.attr("content") {
                if !content.trim().is_empty() {
                    return Some(content.trim().to_string());
                }
            }
        }
    }
    None
}

fn strip_site_suffix(title: &str) -> &str {
    title.strip_suffix(" - YouTube").unwrap_or(title)
}

fn extract_like_count(doc: &Document) -> Option<String> {
    let mut ids = doc.descendants(doc.root());
    ids.push(doc.root());
    // ARIA labels first, in the current locale and in English
    for &id in &ids {
        let Some(node) = doc.node(id) else { continue };
        if let Some(label) = node.attr("aria-label") {
            if let Some(caps) = LIKE_ARIA_JA.captures(label) {
                return Some(caps[1].to_string());
            }
            if let Some(caps) = LIKE_ARIA_EN.captures(label) {
                return Some(caps[1].to_string());
            }
        }
    }
    // Then bare numeric text on like-flavored nodes
    for &id in &ids {
        let Some(node) = doc.node(id) else { continue };
        let like_flavored = node
            .attr("class")
            .map(|c| c.contains("like"))
            .unwrap_or(false)
            || node.attr("id").map(|i| i.contains("like")).unwrap_or(false);
        if like_flavored {
            let text = node.text.trim();
            if COUNT_TEXT.is_match(text) {
                return Some(text.to_string());
            }
        }
    }
    None
}

/// Scan watch-page markup for an embedded like-count field.
/// Patterns are tried in fixed priority order.
pub fn scan_like_count(html: &str) -> Option<String> {
    for pattern in LIKE_FIELD_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(html) {
            return Some(caps[1].trim().to_string());
        }
    }
    None
}

/// The oEmbed request URL for an item id
pub fn oembed_request_url(endpoints: &EndpointsConfig, video_id: &str) -> String {
    let item_url = format!("{}{}", endpoints.shorts_url_base, video_id);
    format!(
        "{}?url={}&format=json",
        endpoints.oembed_url,
        urlencoding::encode(&item_url)
    )
}

/// Asynchronous metadata fallbacks. Implementations must be best-effort:
/// None on any failure, never an error the caller has to handle.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Title from the public embed-metadata endpoint
    async fn fetch_title(&self, video_id: &str) -> Option<String>;

    /// Like count scanned out of the item's own page markup
    async fn fetch_like_count(&self, video_id: &str) -> Option<String>;
}

/// HTTP-backed metadata source
pub struct HttpMetadataSource {
    client: reqwest::Client,
    endpoints: EndpointsConfig,
}

impl HttpMetadataSource {
    pub fn new(endpoints: EndpointsConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("shorts-shield/0.1")
            .build()
            .unwrap_or_default();
        Self { client, endpoints }
    }

    async fn get_text(&self, url: &str) -> Option<String> {
        match self.client.get(url).send().await {
            Ok(resp) => match resp.text().await {
                Ok(body) => Some(body),
                Err(e) => {
                    warn!("Failed to read body from {}: {}", url, e);
                    None
                }
            },
            Err(e) => {
                warn!("Request to {} failed: {}", url, e);
                None
            }
        }
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn fetch_title(&self, video_id: &str) -> Option<String> {
        let url = oembed_request_url(&self.endpoints, video_id);
        let body = self.get_text(&url).await?;
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => {
                let title = value.get("title")?.as_str()?.to_string();
                debug!("oEmbed title for {}: {}", video_id, title);
                Some(title)
            }
            Err(e) => {
                warn!("oEmbed response for {} was not JSON: {}", video_id, e);
                None
            }
        }
    }

    async fn fetch_like_count(&self, video_id: &str) -> Option<String> {
        let url = format!("{}{}", self.endpoints.watch_url_base, video_id);
        let body = self.get_text(&url).await?;
        let count = scan_like_count(&body);
        if count.is_none() {
            debug!("No like-count field found in page for {}", video_id);
        }
        count
    }
}
