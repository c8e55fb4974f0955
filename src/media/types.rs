//! Core types for the media subsystem.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An image offered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCandidate {
    pub url: String,
    /// Caption with HTML stripped; `None` when empty.
    #[serde(rename = "description")]
    pub caption: Option<String>,
    #[serde(rename = "primary")]
    pub is_primary: bool,
}

/// Raw per-file metadata returned by the media index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageInfo {
    /// File page title, e.g. `File:Marseille_Vieux-Port.jpg`.
    pub title: String,
    pub thumb_url: Option<String>,
    pub url: Option<String>,
    /// Caption as returned by the index (may contain HTML).
    pub caption_html: Option<String>,
}

impl ImageInfo {
    /// Thumbnail at the requested width, falling back to the original file.
    pub fn best_url(&self) -> Option<&str> {
        self.thumb_url
            .as_deref()
            .or(self.url.as_deref())
            .filter(|u| !u.is_empty())
    }
}

/// Media index errors. All of them degrade a single curation stage.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("upstream timeout")]
    UpstreamTimeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Parameters of one curation run.
#[derive(Debug, Clone)]
pub struct CurationRequest<'a> {
    pub place_name: &'a str,
    pub parent_region_name: Option<&'a str>,
    pub lang: &'a str,
    pub thumb_width: u32,
    pub extra_count: usize,
    pub max_fetch: usize,
}

impl CurationRequest<'_> {
    /// Final size budget.
    pub fn limit(&self) -> usize {
        self.extra_count.saturating_add(5)
    }
}
