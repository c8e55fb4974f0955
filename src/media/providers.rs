//! Media index providers: the MediaWiki query API.

use super::types::{ImageInfo, MediaError};
use crate::config::MediaConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::io;

/// Largest title batch the query API accepts per call.
pub const MAX_TITLES_PER_QUERY: usize = 50;

/// The three read-only query shapes the curator needs.
///
/// Results are best-effort: callers must not assume ordering or completeness.
pub trait MediaIndex: Send + Sync {
    /// Representative (infobox) thumbnail of a page.
    fn lead_thumbnail(&self, lang: &str, title: &str, width: u32) -> Result<Option<String>, MediaError>;

    /// Up to `limit` file titles linked from a page.
    fn image_titles(&self, lang: &str, title: &str, limit: usize) -> Result<Vec<String>, MediaError>;

    /// URL and caption metadata for at most [`MAX_TITLES_PER_QUERY`] file titles.
    fn image_infos(&self, lang: &str, titles: &[String], width: u32) -> Result<Vec<ImageInfo>, MediaError>;
}

// ─── MediaWiki response shapes ──────────────────────────────────

#[derive(Deserialize, Debug)]
struct QueryResponse {
    #[serde(default)]
    query: Option<QueryBody>,
}

#[derive(Deserialize, Debug)]
struct QueryBody {
    #[serde(default)]
    pages: HashMap<String, Page>,
}

#[derive(Deserialize, Debug)]
struct Page {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    thumbnail: Option<Thumbnail>,
    #[serde(default)]
    images: Vec<LinkedImage>,
    #[serde(default)]
    imageinfo: Vec<RawImageInfo>,
}

#[derive(Deserialize, Debug)]
struct Thumbnail {
    source: Option<String>,
}

#[derive(Deserialize, Debug)]
struct LinkedImage {
    title: String,
}

#[derive(Deserialize, Debug)]
struct RawImageInfo {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    thumburl: Option<String>,
    #[serde(default)]
    extmetadata: Option<HashMap<String, MetadataField>>,
}

#[derive(Deserialize, Debug)]
struct MetadataField {
    #[serde(default)]
    value: serde_json::Value,
}

impl QueryResponse {
    fn into_pages(self) -> Result<HashMap<String, Page>, MediaError> {
        self.query
            .map(|q| q.pages)
            .ok_or_else(|| MediaError::InvalidResponse("missing 'query.pages'".into()))
    }
}

// ─── Wikipedia provider ─────────────────────────────────────────

pub struct WikipediaIndex {
    agent: ureq::Agent,
    api_url: String,
}

impl WikipediaIndex {
    pub fn new(config: &MediaConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build();
        Self {
            agent,
            api_url: config.api_url.clone(),
        }
    }

    fn endpoint(&self, lang: &str) -> String {
        self.api_url.replace("{lang}", lang)
    }

    fn query(&self, lang: &str, params: &[(&str, &str)]) -> Result<HashMap<String, Page>, MediaError> {
        let mut request = self
            .agent
            .get(&self.endpoint(lang))
            .query("action", "query")
            .query("format", "json");
        for (k, v) in params {
            request = request.query(k, v);
        }
        let response = request.call().map_err(map_ureq_error)?;
        let body: QueryResponse = response.into_json().map_err(map_io_error)?;
        body.into_pages()
    }
}

impl MediaIndex for WikipediaIndex {
    fn lead_thumbnail(&self, lang: &str, title: &str, width: u32) -> Result<Option<String>, MediaError> {
        let width = width.to_string();
        let pages = self.query(lang, &[
            ("titles", title),
            ("prop", "pageimages"),
            ("piprop", "thumbnail"),
            ("pithumbsize", width.as_str()),
        ])?;
        // A single title yields a single page.
        Ok(pages
            .into_values()
            .next()
            .and_then(|p| p.thumbnail)
            .and_then(|t| t.source)
            .filter(|s| !s.is_empty()))
    }

    fn image_titles(&self, lang: &str, title: &str, limit: usize) -> Result<Vec<String>, MediaError> {
        let limit = limit.to_string();
        let pages = self.query(lang, &[
            ("titles", title),
            ("prop", "images"),
            ("imlimit", limit.as_str()),
        ])?;
        Ok(pages
            .into_values()
            .flat_map(|p| p.images.into_iter().map(|i| i.title))
            .collect())
    }

    fn image_infos(&self, lang: &str, titles: &[String], width: u32) -> Result<Vec<ImageInfo>, MediaError> {
        if titles.is_empty() {
            return Ok(Vec::new());
        }
        if titles.len() > MAX_TITLES_PER_QUERY {
            return Err(MediaError::InvalidResponse(format!(
                "batch of {} titles exceeds {}",
                titles.len(),
                MAX_TITLES_PER_QUERY
            )));
        }
        let joined = titles.join("|");
        let width = width.to_string();
        let pages = self.query(lang, &[
            ("titles", joined.as_str()),
            ("prop", "imageinfo"),
            ("iiprop", "url|thumburl|extmetadata"),
            ("iiurlwidth", width.as_str()),
        ])?;
        Ok(pages.into_values().filter_map(page_to_info).collect())
    }
}

fn page_to_info(page: Page) -> Option<ImageInfo> {
    let title = page.title?;
    let info = page.imageinfo.into_iter().next()?;
    let caption_html = info
        .extmetadata
        .as_ref()
        .and_then(|m| m.get("ImageDescription"))
        .and_then(|f| f.value.as_str())
        .map(|s| s.to_string());
    Some(ImageInfo {
        title,
        thumb_url: info.thumburl,
        url: info.url,
        caption_html,
    })
}

fn map_ureq_error(err: ureq::Error) -> MediaError {
    match err {
        ureq::Error::Status(code, _) => MediaError::Status(code),
        ureq::Error::Transport(t) if transport_timed_out(&t) => MediaError::UpstreamTimeout,
        ureq::Error::Transport(t) => MediaError::Network(t.to_string()),
    }
}

/// Whether a transport failure was the agent's timeout firing.
pub(crate) fn transport_timed_out(t: &ureq::Transport) -> bool {
    std::error::Error::source(t)
        .and_then(|s| s.downcast_ref::<io::Error>())
        .map(is_timeout)
        .unwrap_or(false)
}

fn map_io_error(err: io::Error) -> MediaError {
    if is_timeout(&err) {
        MediaError::UpstreamTimeout
    } else {
        MediaError::InvalidResponse(err.to_string())
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}
