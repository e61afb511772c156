//! Browsable catalog: root -> sources -> channels.
//!
//! Pure composition over the source registry and the playlist cache.

use std::sync::Arc;
use thiserror::Error;

use crate::models::{BrowseNode, CacheEntry, Channel, MediaClass, PlayMedia, Source, SourceListing};
use crate::services::cache::{CacheError, PlaylistCache};
use crate::services::sources::SourceRegistry;

pub const ROOT_TITLE: &str = "IPTV Media";
pub const STREAM_MIME_TYPE: &str = "application/x-mpegURL";
const PLAYLIST_MIME_TYPE: &str = "playlist";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("configured IPTV source not found: {0}")]
    SourceNotFound(String),
    #[error("channel {index} not found in source {source_id}")]
    ChannelNotFound { source_id: String, index: usize },
    #[error("could not load IPTV playlist: {display_name}")]
    SourceUnavailable {
        source_id: String,
        display_name: String,
        #[source]
        cause: CacheError,
    },
}

/// Identifier of a channel item: `{source_id}/{order}`
pub fn channel_identifier(source_id: &str, order: usize) -> String {
    format!("{}/{}", source_id, order)
}

#[derive(Clone)]
pub struct Catalog {
    sources: Arc<SourceRegistry>,
    cache: PlaylistCache,
}

impl Catalog {
    pub fn new(sources: Arc<SourceRegistry>, cache: PlaylistCache) -> Self {
        Self { sources, cache }
    }

    /// Configured sources, in configuration order
    pub async fn list_sources(&self) -> Vec<Source> {
        self.sources.list().await
    }

    /// Root node with one expandable child per source
    pub async fn root(&self) -> BrowseNode {
        let children: Vec<BrowseNode> = self
            .list_sources()
            .await
            .iter()
            .map(source_node)
            .collect();

        if children.is_empty() {
            tracing::debug!("no IPTV sources configured yet");
        }

        BrowseNode {
            identifier: None,
            title: ROOT_TITLE.to_string(),
            media_class: MediaClass::Directory,
            mime_type: STREAM_MIME_TYPE.to_string(),
            can_play: false,
            can_expand: true,
            thumbnail: None,
            stream_url: None,
            children,
        }
    }

    /// Channels of a source as served by the cache
    pub async fn channels(&self, source_id: &str) -> Result<(Source, Arc<CacheEntry>), CatalogError> {
        let source = self
            .sources
            .get(source_id)
            .await
            .ok_or_else(|| CatalogError::SourceNotFound(source_id.to_string()))?;

        let entry = self
            .cache
            .get_channels(&source.id, &source.playlist_url)
            .await
            .map_err(|cause| CatalogError::SourceUnavailable {
                source_id: source.id.clone(),
                display_name: source.display_name.clone(),
                cause,
            })?;

        Ok((source, entry))
    }

    /// Source node with its channels as playable children, in playlist order
    pub async fn browse(&self, source_id: &str) -> Result<SourceListing, CatalogError> {
        let (source, entry) = self.channels(source_id).await?;

        let mut node = source_node(&source);
        node.children = entry
            .channels
            .iter()
            .map(|channel| channel_node(&source.id, channel))
            .collect();

        if node.children.is_empty() {
            tracing::info!(source_id = %source.id, url = %source.playlist_url, "no channels found in playlist");
            node.can_expand = false;
        }

        Ok(SourceListing {
            node,
            fetched_at: entry.fetched_at,
            stale: !entry.is_fresh(),
        })
    }

    /// Stream URL for a channel, no proxying
    pub async fn resolve_playback(
        &self,
        source_id: &str,
        index: usize,
    ) -> Result<PlayMedia, CatalogError> {
        let (source, entry) = self.channels(source_id).await?;

        let channel = entry
            .channels
            .get(index)
            .ok_or_else(|| CatalogError::ChannelNotFound {
                source_id: source.id.clone(),
                index,
            })?;

        tracing::debug!(source_id = %source.id, index = index, url = %channel.stream_url, "resolved playback");
        Ok(PlayMedia {
            url: channel.stream_url.clone(),
            mime_type: STREAM_MIME_TYPE.to_string(),
        })
    }
}

fn source_node(source: &Source) -> BrowseNode {
    BrowseNode {
        identifier: Some(source.id.clone()),
        title: source.display_name.clone(),
        media_class: MediaClass::Playlist,
        mime_type: PLAYLIST_MIME_TYPE.to_string(),
        can_play: false,
        can_expand: true,
        thumbnail: source.thumbnail_url.clone(),
        stream_url: None,
        children: Vec::new(),
    }
}

fn channel_node(source_id: &str, channel: &Channel) -> BrowseNode {
    BrowseNode {
        identifier: Some(channel_identifier(source_id, channel.order)),
        title: channel.name.clone(),
        media_class: MediaClass::Channel,
        mime_type: STREAM_MIME_TYPE.to_string(),
        can_play: true,
        can_expand: false,
        thumbnail: channel.logo_url.clone(),
        stream_url: Some(channel.stream_url.clone()),
        children: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::directory::{CountryDirectory, ResolveError, ResolvedCountry};
    use crate::services::fetcher::{FetchError, PlaylistFetch};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    struct NoDirectory;

    #[async_trait]
    impl CountryDirectory for NoDirectory {
        async fn resolve(&self, country_code: &str) -> Result<ResolvedCountry, ResolveError> {
            Err(ResolveError::NotFound(country_code.to_string()))
        }
    }

    /// Serves fixed bodies per URL; unknown URLs fail
    struct MapFetcher(HashMap<String, String>);

    #[async_trait]
    impl PlaylistFetch for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.0.get(url).cloned().ok_or(FetchError::Status {
                status: 404,
                reason: "Not Found".to_string(),
            })
        }
    }

    async fn catalog() -> (Catalog, Vec<Source>) {
        let mut bodies = HashMap::new();
        bodies.insert(
            "http://x/news.m3u".to_string(),
            "#EXTM3U\n#EXTINF:-1 tvg-logo=\"http://x/z.png\",Zulu News\nhttp://x/zulu\n#EXTINF:-1,Alpha News\nhttp://x/alpha\n".to_string(),
        );
        bodies.insert("http://x/empty.m3u".to_string(), "#EXTM3U\n".to_string());

        let cache = PlaylistCache::new(Arc::new(MapFetcher(bodies)), Duration::from_secs(60));
        let registry = Arc::new(SourceRegistry::in_memory(Arc::new(NoDirectory), cache.clone()));

        let mut sources = Vec::new();
        for (url, name) in [
            ("http://x/news.m3u", "News"),
            ("http://x/empty.m3u", "Empty"),
            ("http://x/down.m3u", "Down"),
        ] {
            sources.push(registry.add_custom(url, Some(name)).await.unwrap());
        }

        (Catalog::new(registry, cache), sources)
    }

    #[tokio::test]
    async fn test_root_lists_sources_in_configuration_order() {
        let (catalog, sources) = catalog().await;
        let root = catalog.root().await;

        assert_eq!(root.title, ROOT_TITLE);
        assert!(root.can_expand);
        let titles: Vec<&str> = root.children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["News", "Empty", "Down"]);
        assert_eq!(root.children[0].identifier.as_deref(), Some(sources[0].id.as_str()));
        assert!(root.children.iter().all(|c| c.media_class == MediaClass::Playlist));
    }

    #[tokio::test]
    async fn test_browse_keeps_playlist_order() {
        let (catalog, sources) = catalog().await;
        let listing = catalog.browse(&sources[0].id).await.unwrap();

        assert!(!listing.stale);
        let children = &listing.node.children;
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].title, "Zulu News");
        assert_eq!(children[0].thumbnail.as_deref(), Some("http://x/z.png"));
        assert_eq!(children[0].stream_url.as_deref(), Some("http://x/zulu"));
        assert!(children[0].can_play);
        assert_eq!(children[1].title, "Alpha News");
        assert_eq!(children[1].thumbnail, None);
        assert_eq!(
            children[1].identifier.as_deref(),
            Some(channel_identifier(&sources[0].id, 1).as_str())
        );
    }

    #[tokio::test]
    async fn test_browse_empty_playlist_is_not_expandable() {
        let (catalog, sources) = catalog().await;
        let listing = catalog.browse(&sources[1].id).await.unwrap();

        assert!(listing.node.children.is_empty());
        assert!(!listing.node.can_expand);
    }

    #[tokio::test]
    async fn test_browse_unavailable_source_does_not_affect_others() {
        let (catalog, sources) = catalog().await;

        match catalog.browse(&sources[2].id).await {
            Err(CatalogError::SourceUnavailable { source_id, cause, .. }) => {
                assert_eq!(source_id, sources[2].id);
                assert!(matches!(cause, CacheError::Fetch(FetchError::Status { status: 404, .. })));
            }
            other => panic!("expected SourceUnavailable, got {:?}", other.map(|l| l.node.title)),
        }

        assert!(catalog.browse(&sources[0].id).await.is_ok());
    }

    #[tokio::test]
    async fn test_browse_unknown_source() {
        let (catalog, _) = catalog().await;
        assert!(matches!(
            catalog.browse("nope").await,
            Err(CatalogError::SourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_playback() {
        let (catalog, sources) = catalog().await;

        let media = catalog.resolve_playback(&sources[0].id, 1).await.unwrap();
        assert_eq!(media.url, "http://x/alpha");
        assert_eq!(media.mime_type, STREAM_MIME_TYPE);

        assert!(matches!(
            catalog.resolve_playback(&sources[0].id, 5).await,
            Err(CatalogError::ChannelNotFound { index: 5, .. })
        ));
    }
}
