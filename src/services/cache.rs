//! In-memory playlist cache.
//!
//! Parsed channel lists are kept per source id with a uniform TTL. Concurrent
//! refreshes of the same source are collapsed into a single fetch whose result
//! is shared by every waiting caller. The refresh runs on its own task, so a
//! caller that gives up does not cancel it for the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, OnceCell, RwLock};

use crate::models::CacheEntry;
use crate::services::fetcher::{FetchError, PlaylistFetch};
use crate::services::m3u_parser;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("source {0} was removed while its playlist was loading")]
    Evicted(String),
    #[error("playlist refresh aborted: {0}")]
    Aborted(String),
}

type InFlightResult = Result<Arc<CacheEntry>, CacheError>;

/// Shared slot for one in-progress refresh
struct InFlightState {
    result: OnceCell<InFlightResult>,
    notify: Notify,
}

impl InFlightState {
    fn new() -> Self {
        Self {
            result: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    fn set_result(&self, result: InFlightResult) {
        let _ = self.result.set(result);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> InFlightResult {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            let notified = self.notify.notified();
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            notified.await;
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entry_count: usize,
    pub in_flight_count: usize,
    pub ttl: Duration,
}

struct CacheInner {
    fetcher: Arc<dyn PlaylistFetch>,
    /// Latest good entry per source id (may be stale)
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    /// Refreshes in progress. Lock order: `in_flight` before `entries`.
    in_flight: Mutex<HashMap<String, Arc<InFlightState>>>,
    ttl: Duration,
}

/// Playlist cache service. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PlaylistCache {
    inner: Arc<CacheInner>,
}

impl PlaylistCache {
    pub fn new(fetcher: Arc<dyn PlaylistFetch>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                fetcher,
                entries: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                ttl,
            }),
        }
    }

    /// Get the channel list for a source, refreshing it if absent or expired.
    ///
    /// When a refresh fails and an older entry exists, that entry is returned
    /// (check `CacheEntry::is_fresh`). The error is returned only when there is
    /// nothing to fall back to.
    pub async fn get_channels(
        &self,
        source_id: &str,
        playlist_url: &str,
    ) -> Result<Arc<CacheEntry>, CacheError> {
        if let Some(entry) = self.fresh_entry(source_id).await {
            tracing::debug!(source_id = source_id, "playlist cache hit");
            return Ok(entry);
        }

        let request = {
            let mut in_flight = self.inner.in_flight.lock().await;

            // A refresh may have completed between the check above and the lock
            if let Some(entry) = self.fresh_entry(source_id).await {
                return Ok(entry);
            }

            match in_flight.get(source_id) {
                Some(existing) => {
                    tracing::debug!(source_id = source_id, "joining in-flight refresh");
                    existing.clone()
                }
                None => {
                    let request = Arc::new(InFlightState::new());
                    in_flight.insert(source_id.to_string(), request.clone());
                    self.spawn_refresh(source_id, playlist_url, request.clone());
                    request
                }
            }
        };

        request.wait().await
    }

    /// Current entry for a source, fresh or not, without triggering a refresh
    pub async fn peek(&self, source_id: &str) -> Option<Arc<CacheEntry>> {
        self.inner.entries.read().await.get(source_id).cloned()
    }

    /// Drop the entry for a source. A refresh in progress for it is abandoned
    /// and its waiters receive `CacheError::Evicted`.
    pub async fn remove(&self, source_id: &str) -> bool {
        let mut in_flight = self.inner.in_flight.lock().await;
        if let Some(request) = in_flight.remove(source_id) {
            request.set_result(Err(CacheError::Evicted(source_id.to_string())));
        }
        let removed = self.inner.entries.write().await.remove(source_id).is_some();
        drop(in_flight);

        if removed {
            tracing::info!(source_id = source_id, "playlist cache entry evicted");
        }
        removed
    }

    pub async fn stats(&self) -> CacheStats {
        let in_flight_count = self.inner.in_flight.lock().await.len();
        let entry_count = self.inner.entries.read().await.len();
        CacheStats {
            entry_count,
            in_flight_count,
            ttl: self.inner.ttl,
        }
    }

    async fn fresh_entry(&self, source_id: &str) -> Option<Arc<CacheEntry>> {
        let entries = self.inner.entries.read().await;
        entries
            .get(source_id)
            .filter(|entry| entry.is_fresh())
            .cloned()
    }

    /// Fetch and parse on a task of its own. Parsing runs on the blocking
    /// pool and outside every cache lock; a panic in either step still
    /// completes the waiters.
    fn spawn_refresh(&self, source_id: &str, playlist_url: &str, request: Arc<InFlightState>) {
        let cache = self.clone();
        let source_id = source_id.to_string();
        let playlist_url = playlist_url.to_string();

        tokio::spawn(async move {
            tracing::info!(source_id = %source_id, url = %playlist_url, "refreshing playlist");

            let refresh = tokio::spawn(load_entry(
                cache.inner.fetcher.clone(),
                source_id.clone(),
                playlist_url,
                cache.inner.ttl,
            ));
            let result = match refresh.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(source_id = %source_id, error = %e, "playlist refresh panicked");
                    Err(CacheError::Aborted(e.to_string()))
                }
            };

            cache.complete(&source_id, &request, result).await;
        });
    }

    async fn complete(&self, source_id: &str, request: &Arc<InFlightState>, result: InFlightResult) {
        let mut in_flight = self.inner.in_flight.lock().await;

        // Removed (or superseded) while we were fetching: nothing to install
        let is_current = in_flight
            .get(source_id)
            .map(|current| Arc::ptr_eq(current, request))
            .unwrap_or(false);
        if !is_current {
            return;
        }
        in_flight.remove(source_id);

        let outcome = match result {
            Ok(entry) => {
                tracing::info!(
                    source_id = source_id,
                    channels = entry.channels.len(),
                    "playlist cached"
                );

                self.inner
                    .entries
                    .write()
                    .await
                    .insert(source_id.to_string(), entry.clone());
                Ok(entry)
            }
            Err(err) => match self.inner.entries.read().await.get(source_id) {
                Some(stale) => {
                    tracing::warn!(
                        source_id = source_id,
                        error = %err,
                        fetched_at = %stale.fetched_at,
                        "refresh failed, serving stale playlist"
                    );
                    Ok(stale.clone())
                }
                None => {
                    tracing::error!(source_id = source_id, error = %err, "playlist fetch failed");
                    Err(err)
                }
            },
        };

        drop(in_flight);
        request.set_result(outcome);
    }
}

async fn load_entry(
    fetcher: Arc<dyn PlaylistFetch>,
    source_id: String,
    playlist_url: String,
    ttl: Duration,
) -> InFlightResult {
    let raw = match fetcher.fetch(&playlist_url).await {
        Ok(raw) => raw,
        Err(err) => return Err(CacheError::Fetch(err)),
    };

    let parsed = tokio::task::spawn_blocking(move || {
        let channels = m3u_parser::parse(&raw);
        Arc::new(CacheEntry::new(source_id, channels, Utc::now(), ttl))
    })
    .await;

    parsed.map_err(|e| CacheError::Aborted(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PLAYLIST: &str = "#EXTM3U\n#EXTINF:-1,One\nhttp://x/1\n#EXTINF:-1,Two\nhttp://x/2\n";

    struct FakeFetcher {
        calls: AtomicUsize,
        delay: std::sync::Mutex<Duration>,
        response: std::sync::Mutex<Result<String, FetchError>>,
    }

    impl FakeFetcher {
        fn new(body: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: std::sync::Mutex::new(Duration::ZERO),
                response: std::sync::Mutex::new(Ok(body.to_string())),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap() = delay;
        }

        fn set_response(&self, response: Result<String, FetchError>) {
            *self.response.lock().unwrap() = response;
        }
    }

    #[async_trait]
    impl PlaylistFetch for FakeFetcher {
        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.response.lock().unwrap().clone()
        }
    }

    fn transport_error() -> FetchError {
        FetchError::Transport("connection reset".to_string())
    }

    #[tokio::test]
    async fn test_fresh_entry_is_served_without_fetch() {
        let fetcher = FakeFetcher::new(PLAYLIST);
        let cache = PlaylistCache::new(fetcher.clone(), Duration::from_secs(60));

        let first = cache.get_channels("us", "http://x/us.m3u").await.unwrap();
        for _ in 0..5 {
            let again = cache.get_channels("us", "http://x/us.m3u").await.unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(first.channels.len(), 2);
        assert_eq!(first.channels[0].name, "One");
    }

    #[tokio::test]
    async fn test_expired_entry_triggers_one_refetch() {
        let fetcher = FakeFetcher::new(PLAYLIST);
        let cache = PlaylistCache::new(fetcher.clone(), Duration::from_millis(50));

        let first = cache.get_channels("us", "http://x/us.m3u").await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!first.is_fresh());

        let second = cache.get_channels("us", "http://x/us.m3u").await.unwrap();
        let third = cache.get_channels("us", "http://x/us.m3u").await.unwrap();

        assert_eq!(fetcher.calls(), 2);
        assert!(second.fetched_at > first.fetched_at);
        assert!(Arc::ptr_eq(&second, &third));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let fetcher = FakeFetcher::new(PLAYLIST);
        fetcher.set_delay(Duration::from_millis(100));
        let cache = PlaylistCache::new(fetcher.clone(), Duration::from_secs(60));

        let calls = (0..10).map(|_| cache.get_channels("us", "http://x/us.m3u"));
        let results = futures::future::join_all(calls).await;

        assert_eq!(fetcher.calls(), 1);
        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_error() {
        let fetcher = FakeFetcher::new(PLAYLIST);
        fetcher.set_delay(Duration::from_millis(50));
        fetcher.set_response(Err(transport_error()));
        let cache = PlaylistCache::new(fetcher.clone(), Duration::from_secs(60));

        let calls = (0..5).map(|_| cache.get_channels("us", "http://x/us.m3u"));
        let results = futures::future::join_all(calls).await;

        assert_eq!(fetcher.calls(), 1);
        for result in results {
            assert_eq!(result.unwrap_err(), CacheError::Fetch(transport_error()));
        }
    }

    #[tokio::test]
    async fn test_refresh_of_one_key_does_not_block_another() {
        let fetcher = FakeFetcher::new(PLAYLIST);
        let cache = PlaylistCache::new(fetcher.clone(), Duration::from_secs(60));
        cache.get_channels("b", "http://x/b.m3u").await.unwrap();

        fetcher.set_delay(Duration::from_millis(500));
        let slow = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_channels("a", "http://x/a.m3u").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let fast = tokio::time::timeout(
            Duration::from_millis(100),
            cache.get_channels("b", "http://x/b.m3u"),
        )
        .await;
        assert!(fast.expect("fresh read should not wait on another key").is_ok());

        assert!(slow.await.unwrap().is_ok());
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_entry_served_when_refresh_fails() {
        let fetcher = FakeFetcher::new(PLAYLIST);
        let cache = PlaylistCache::new(fetcher.clone(), Duration::from_millis(50));

        let good = cache.get_channels("us", "http://x/us.m3u").await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        fetcher.set_response(Err(transport_error()));

        let fallback = cache.get_channels("us", "http://x/us.m3u").await.unwrap();
        assert_eq!(fetcher.calls(), 2);
        assert!(Arc::ptr_eq(&good, &fallback));
        assert!(!fallback.is_fresh());
    }

    #[tokio::test]
    async fn test_error_without_prior_entry_is_not_cached() {
        let fetcher = FakeFetcher::new(PLAYLIST);
        fetcher.set_response(Err(FetchError::Status {
            status: 404,
            reason: "Not Found".to_string(),
        }));
        let cache = PlaylistCache::new(fetcher.clone(), Duration::from_secs(60));

        assert!(matches!(
            cache.get_channels("us", "http://x/us.m3u").await,
            Err(CacheError::Fetch(FetchError::Status { status: 404, .. }))
        ));
        assert!(cache.peek("us").await.is_none());

        fetcher.set_response(Ok(PLAYLIST.to_string()));
        assert!(cache.get_channels("us", "http://x/us.m3u").await.is_ok());
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_remove_forces_refetch() {
        let fetcher = FakeFetcher::new(PLAYLIST);
        let cache = PlaylistCache::new(fetcher.clone(), Duration::from_secs(60));

        cache.get_channels("us", "http://x/us.m3u").await.unwrap();
        assert!(cache.remove("us").await);
        assert!(!cache.remove("us").await);
        assert_eq!(cache.stats().await.entry_count, 0);

        cache.get_channels("us", "http://x/us.m3u").await.unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_cancel_refresh() {
        let fetcher = FakeFetcher::new(PLAYLIST);
        fetcher.set_delay(Duration::from_millis(100));
        let cache = PlaylistCache::new(fetcher.clone(), Duration::from_secs(60));

        let caller = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_channels("us", "http://x/us.m3u").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let entry = cache.peek("us").await.expect("refresh should complete");
        assert_eq!(entry.channels.len(), 2);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_remove_during_refresh_wakes_waiters() {
        let fetcher = FakeFetcher::new(PLAYLIST);
        fetcher.set_delay(Duration::from_millis(100));
        let cache = PlaylistCache::new(fetcher.clone(), Duration::from_secs(60));

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_channels("us", "http://x/us.m3u").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.remove("us").await;

        assert_eq!(
            waiter.await.unwrap().unwrap_err(),
            CacheError::Evicted("us".to_string())
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.peek("us").await.is_none());
        assert_eq!(cache.stats().await.in_flight_count, 0);
    }

    /// Per-URL bodies and delays
    struct RoutedFetcher(HashMap<String, (String, Duration)>);

    #[async_trait]
    impl PlaylistFetch for RoutedFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            let (body, delay) = self
                .0
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;
            tokio::time::sleep(delay).await;
            Ok(body)
        }
    }

    fn large_playlist(count: usize) -> String {
        let mut body = String::from("#EXTM3U\n");
        for i in 0..count {
            body.push_str(&format!(
                "#EXTINF:-1 tvg-id=\"c{i}\" tvg-logo=\"http://x/{i}.png\" group-title=\"G\",Channel {i}\nhttp://x/{i}\n"
            ));
        }
        body
    }

    #[tokio::test]
    async fn test_misses_on_different_keys_do_not_wait_on_each_other() {
        let mut routes = HashMap::new();
        routes.insert("http://x/a.m3u".to_string(), (PLAYLIST.to_string(), Duration::from_millis(400)));
        routes.insert("http://x/b.m3u".to_string(), (PLAYLIST.to_string(), Duration::ZERO));
        let cache = PlaylistCache::new(Arc::new(RoutedFetcher(routes)), Duration::from_secs(60));

        let slow = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_channels("a", "http://x/a.m3u").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let fast = tokio::time::timeout(
            Duration::from_millis(150),
            cache.get_channels("b", "http://x/b.m3u"),
        )
        .await;
        assert!(fast.expect("miss on b should not wait for a").is_ok());
        assert_eq!(cache.stats().await.in_flight_count, 1);

        assert!(slow.await.unwrap().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parse_of_one_key_does_not_block_miss_on_another() {
        let mut routes = HashMap::new();
        routes.insert("http://x/a.m3u".to_string(), (large_playlist(200_000), Duration::ZERO));
        routes.insert("http://x/b.m3u".to_string(), (PLAYLIST.to_string(), Duration::ZERO));
        let cache = PlaylistCache::new(Arc::new(RoutedFetcher(routes)), Duration::from_secs(60));

        let started = std::time::Instant::now();
        let big = {
            let cache = cache.clone();
            tokio::spawn(async move {
                let result = cache.get_channels("a", "http://x/a.m3u").await;
                (result, started.elapsed())
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let small = cache.get_channels("b", "http://x/b.m3u").await.unwrap();
        let small_done = started.elapsed();
        assert_eq!(small.channels.len(), 2);

        let (big, big_done) = big.await.unwrap();
        assert_eq!(big.unwrap().channels.len(), 200_000);
        assert!(
            small_done < big_done,
            "miss on b finished after the large parse of a ({:?} >= {:?})",
            small_done,
            big_done
        );
    }

    #[tokio::test]
    async fn test_ttl_beyond_date_range_never_expires() {
        let fetcher = FakeFetcher::new(PLAYLIST);
        let cache = PlaylistCache::new(fetcher.clone(), Duration::from_millis(10u64.pow(17)));

        let entry = tokio::time::timeout(
            Duration::from_secs(2),
            cache.get_channels("us", "http://x/us.m3u"),
        )
        .await
        .expect("refresh should complete")
        .unwrap();

        assert_eq!(entry.expires_at, chrono::DateTime::<Utc>::MAX_UTC);
        assert!(entry.is_fresh());
        cache.get_channels("us", "http://x/us.m3u").await.unwrap();
        assert_eq!(fetcher.calls(), 1);
    }

    struct PanickingFetcher;

    #[async_trait]
    impl PlaylistFetch for PanickingFetcher {
        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            panic!("fetcher blew up");
        }
    }

    #[tokio::test]
    async fn test_panicking_refresh_completes_waiters() {
        let cache = PlaylistCache::new(Arc::new(PanickingFetcher), Duration::from_secs(60));

        for _ in 0..2 {
            let calls = (0..3).map(|_| cache.get_channels("us", "http://x/us.m3u"));
            let results = tokio::time::timeout(Duration::from_secs(2), futures::future::join_all(calls))
                .await
                .expect("waiters should not hang");

            for result in results {
                assert!(matches!(result, Err(CacheError::Aborted(_))));
            }
            assert_eq!(cache.stats().await.in_flight_count, 0);
        }
        assert!(cache.peek("us").await.is_none());
    }
}
