//! Target classification.
//!
//! A target identifier is either a direct stream id (an 11-character token as
//! used in watch URLs) or a channel handle. The two use different URL
//! templates; everything downstream treats the target as opaque.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static STREAM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid regex"));
static ALL_LOWERCASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+$").expect("valid regex"));

/// How a target identifier resolves to a live page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Direct stream id, watched via `watch?v=`.
    Stream,
    /// Channel handle, watched via the channel's `/live` page.
    Channel,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Stream => write!(f, "live"),
            TargetKind::Channel => write!(f, "channel"),
        }
    }
}

/// A single monitored entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub kind: TargetKind,
    pub id: String,
}

impl Target {
    /// Classify a raw identifier by shape.
    ///
    /// An 11-character alphanumeric/`_`/`-` token that is not a plain
    /// lowercase word is a stream id; everything else is a channel handle.
    pub fn classify(id: impl Into<String>) -> Self {
        let id = id.into();
        let kind = if STREAM_ID.is_match(&id) && !ALL_LOWERCASE.is_match(&id) {
            TargetKind::Stream
        } else {
            TargetKind::Channel
        };
        Self { kind, id }
    }

    /// URL of the live page for this target.
    pub fn watch_url(&self) -> String {
        match self.kind {
            TargetKind::Stream => format!("https://www.youtube.com/watch?v={}", self.id),
            TargetKind::Channel => format!("https://www.youtube.com/@{}/live", self.id),
        }
    }

    /// Composite key used for per-target state.
    pub fn state_key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
