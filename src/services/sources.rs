//! Configured sources
//!
//! Keeps the ordered list of playlist sources, persists it as JSON and evicts
//! cache entries when a source goes away or changes URL.

use sha1::{Digest, Sha1};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use url::Url;

use crate::models::{Source, SourceKind};
use crate::services::cache::PlaylistCache;
use crate::services::directory::{CountryDirectory, ResolveError};

const DEFAULT_CUSTOM_NAME: &str = "Custom IPTV";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source '{0}' not found")]
    NotFound(String),
    #[error("not an M3U/M3U8 playlist URL: {0}")]
    InvalidUrl(String),
    #[error("display name must not be empty")]
    InvalidName,
    #[error("playlist URL of directory source '{0}' cannot be changed")]
    UrlNotEditable(String),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("failed to persist sources: {0}")]
    Persist(String),
}

/// Generate SHA1 hash of URL
pub fn hash_url(url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}

pub fn custom_source_id(url: &str) -> String {
    format!("custom_{}", &hash_url(url)[..12])
}

pub fn directory_source_id(country_code: &str) -> String {
    format!("iptv_org_{}", country_code.to_lowercase())
}

/// Custom URLs must be http(s) and point at an .m3u/.m3u8 file
fn validate_playlist_url(url: &str) -> Result<String, SourceError> {
    let url = url.trim();
    let parsed = Url::parse(url).map_err(|_| SourceError::InvalidUrl(url.to_string()))?;

    let is_http = matches!(parsed.scheme(), "http" | "https");
    let path = parsed.path().to_lowercase();
    let lower = url.to_lowercase();
    let is_m3u = [".m3u", ".m3u8"]
        .iter()
        .any(|ext| path.ends_with(ext) || lower.ends_with(ext));

    if is_http && is_m3u {
        Ok(url.to_string())
    } else {
        Err(SourceError::InvalidUrl(url.to_string()))
    }
}

fn validate_name(name: &str) -> Result<String, SourceError> {
    let name = name.trim();
    if name.is_empty() {
        Err(SourceError::InvalidName)
    } else {
        Ok(name.to_string())
    }
}

/// Ordered, persisted list of sources
pub struct SourceRegistry {
    sources: RwLock<Vec<Source>>,
    path: Option<PathBuf>,
    directory: Arc<dyn CountryDirectory>,
    cache: PlaylistCache,
}

impl SourceRegistry {
    /// Registry without a backing file
    pub fn in_memory(directory: Arc<dyn CountryDirectory>, cache: PlaylistCache) -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            path: None,
            directory,
            cache,
        }
    }

    /// Load sources from a JSON file. A missing file is an empty registry.
    pub async fn load(
        path: impl Into<PathBuf>,
        directory: Arc<dyn CountryDirectory>,
        cache: PlaylistCache,
    ) -> Result<Self, SourceError> {
        let path = path.into();

        let sources = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str::<Vec<Source>>(&content)
                .map_err(|e| SourceError::Persist(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(SourceError::Persist(format!("{}: {}", path.display(), e))),
        };

        tracing::info!(count = sources.len(), path = %path.display(), "loaded configured sources");

        Ok(Self {
            sources: RwLock::new(sources),
            path: Some(path),
            directory,
            cache,
        })
    }

    pub async fn list(&self) -> Vec<Source> {
        self.sources.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<Source> {
        self.sources.read().await.iter().find(|s| s.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sources.read().await.len()
    }

    /// Add (or refresh) a source resolved from the country directory
    pub async fn add_country(&self, country_code: &str) -> Result<Source, SourceError> {
        let resolved = self.directory.resolve(country_code).await?;

        let source = Source {
            id: directory_source_id(&resolved.code),
            display_name: format!("IPTV.org - {}", resolved.name),
            playlist_url: resolved.playlist_url,
            kind: SourceKind::Directory {
                country_code: resolved.code,
            },
            thumbnail_url: Some(resolved.flag_url),
        };

        tracing::info!(
            source_id = %source.id,
            url = %source.playlist_url,
            "configuring directory source"
        );
        self.upsert(source).await
    }

    /// Add (or refresh) a source with a user supplied playlist URL
    pub async fn add_custom(&self, url: &str, name: Option<&str>) -> Result<Source, SourceError> {
        let url = validate_playlist_url(url)?;
        let display_name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => DEFAULT_CUSTOM_NAME.to_string(),
        };

        let source = Source {
            id: custom_source_id(&url),
            display_name,
            playlist_url: url,
            kind: SourceKind::Custom,
            thumbnail_url: None,
        };

        tracing::info!(source_id = %source.id, url = %source.playlist_url, "configuring custom source");
        self.upsert(source).await
    }

    /// Reconfigure a source. The URL can only change for custom sources.
    pub async fn update(
        &self,
        id: &str,
        display_name: &str,
        playlist_url: Option<&str>,
    ) -> Result<Source, SourceError> {
        let display_name = validate_name(display_name)?;

        let mut sources = self.sources.write().await;
        let mut next = sources.clone();
        let source = next
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| SourceError::NotFound(id.to_string()))?;

        let mut url_changed = false;
        if let Some(url) = playlist_url {
            if source.is_custom() {
                let url = validate_playlist_url(url)?;
                url_changed = url != source.playlist_url;
                source.playlist_url = url;
            } else if url.trim() != source.playlist_url {
                return Err(SourceError::UrlNotEditable(id.to_string()));
            }
        }
        source.display_name = display_name;
        let updated = source.clone();

        self.persist(&next).await?;
        *sources = next;
        drop(sources);

        if url_changed {
            self.cache.remove(id).await;
        }

        tracing::info!(source_id = %updated.id, name = %updated.display_name, "source updated");
        Ok(updated)
    }

    /// Remove a source and evict its cached playlist
    pub async fn remove(&self, id: &str) -> Result<Source, SourceError> {
        let mut sources = self.sources.write().await;
        let index = sources
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| SourceError::NotFound(id.to_string()))?;

        let mut next = sources.clone();
        let removed = next.remove(index);

        self.persist(&next).await?;
        *sources = next;
        drop(sources);

        self.cache.remove(id).await;
        tracing::info!(source_id = %removed.id, name = %removed.display_name, "source removed");
        Ok(removed)
    }

    /// Insert a new source at the end, or replace an existing one in place
    async fn upsert(&self, source: Source) -> Result<Source, SourceError> {
        let mut sources = self.sources.write().await;
        let mut next = sources.clone();

        let url_changed = match next.iter().position(|s| s.id == source.id) {
            Some(index) => {
                let changed = next[index].playlist_url != source.playlist_url;
                next[index] = source.clone();
                changed
            }
            None => {
                next.push(source.clone());
                false
            }
        };

        self.persist(&next).await?;
        *sources = next;
        drop(sources);

        if url_changed {
            self.cache.remove(&source.id).await;
        }
        Ok(source)
    }

    /// Write the list atomically (temp file + rename)
    async fn persist(&self, sources: &[Source]) -> Result<(), SourceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let write = async {
            let content = serde_json::to_string_pretty(sources)?;
            let tmp_path = path.with_extension("json.tmp");

            let mut file = File::create(&tmp_path).await?;
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);

            fs::rename(&tmp_path, path).await?;
            Ok::<(), anyhow::Error>(())
        };

        write
            .await
            .map_err(|e| SourceError::Persist(format!("{}: {}", path.display(), e)))
    }
}
