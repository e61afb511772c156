use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Single playlist entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub name: String,
    pub stream_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvg_id: Option<String>,
    /// Position within the playlist (0-based)
    pub order: usize,
}

/// Parsed channel list for one source, as held by the playlist cache
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub source_id: String,
    pub channels: Vec<Channel>,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        source_id: impl Into<String>,
        channels: Vec<Channel>,
        fetched_at: DateTime<Utc>,
        ttl: std::time::Duration,
    ) -> Self {
        // TTLs past the representable range never expire
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| fetched_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            source_id: source_id.into(),
            channels,
            fetched_at,
            expires_at,
        }
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }
}

/// Media class of a browse node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaClass {
    Directory,
    Playlist,
    Channel,
}

/// Node of the browsable catalog tree.
///
/// Containers (root, sources) have `can_expand`; items (channels) have
/// `can_play` and their identifier resolves to a stream URL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub title: String,
    pub media_class: MediaClass,
    pub mime_type: String,
    pub can_play: bool,
    pub can_expand: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BrowseNode>,
}

/// Browse result for a single source
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceListing {
    pub node: BrowseNode,
    pub fetched_at: DateTime<Utc>,
    /// True when served from an expired entry because the refresh failed
    pub stale: bool,
}

/// Playable target for a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayMedia {
    pub url: String,
    pub mime_type: String,
}
