//! Viewer-text extraction capability.
//!
//! The monitoring engine only needs one thing from the outside world per
//! target: the rendered viewer-count text, or nothing. `ViewerSource` is
//! that seam; the HTTP implementation below probes the live page markup
//! without rendering it.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;

use crate::domain::Target;
use crate::error::Result;

/// Fetch the raw viewer-count text for a target.
#[async_trait]
pub trait ViewerSource: Send + Sync {
    /// `Ok(Some(text))` when the viewer count was rendered, `Ok(None)` when
    /// the page loaded without one, `Err` on navigation/timeout failure.
    async fn fetch_viewer_text(&self, target: &Target) -> Result<Option<String>>;
}

// Player responses embed the count either as renderer runs or as a plain
// aria label; the "watching now" phrase is the last resort.
static VIEW_COUNT_RUNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""viewCount":\{"runs":\[\{"text":"([^"]+)""#).expect("valid regex")
});
static VIEW_COUNT_SIMPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""viewCount":\{"simpleText":"([^"]+)""#).expect("valid regex")
});
static WATCHING_NOW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d][\d.,\s]*\s*watching now)").expect("valid regex"));

/// HTTP-based viewer source: fetches the target's live page and pulls the
/// viewer-count text out of the embedded player response.
pub struct HttpViewerSource {
    client: Client,
}

impl HttpViewerSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ViewerSource for HttpViewerSource {
    async fn fetch_viewer_text(&self, target: &Target) -> Result<Option<String>> {
        let response = self.client.get(target.watch_url()).send().await?;
        let body = response.error_for_status()?.text().await?;
        Ok(extract_viewer_text(&body))
    }
}

fn extract_viewer_text(body: &str) -> Option<String> {
    for pattern in [&*VIEW_COUNT_RUNS, &*VIEW_COUNT_SIMPLE, &*WATCHING_NOW] {
        if let Some(captures) = pattern.captures(body) {
            let text = captures.get(1)?.as_str().trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}
