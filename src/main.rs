mod config;
mod models;
mod routes;
mod services;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::services::{
    cache::PlaylistCache,
    catalog::Catalog,
    directory::{DirectoryClient, DirectoryOptions},
    fetcher::{FetcherOptions, PlaylistFetcher},
    sources::SourceRegistry,
};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub sources: Arc<SourceRegistry>,
    pub cache: PlaylistCache,
    pub catalog: Catalog,
    pub directory: Arc<DirectoryClient>,
    pub start_time: Instant,
}

/// Build the HTTP router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .route("/live", get(routes::health::live))
        // Catalog endpoints
        .route("/api/catalog", get(routes::catalog::get_root))
        .route("/api/catalog/:source_id", get(routes::catalog::browse_source))
        .route(
            "/api/catalog/:source_id/:index/play",
            get(routes::catalog::play_channel),
        )
        // Source configuration endpoints
        .route("/api/sources", get(routes::sources::list_sources))
        .route(
            "/api/sources/country",
            post(routes::sources::add_country_source),
        )
        .route(
            "/api/sources/custom",
            post(routes::sources::add_custom_source),
        )
        .route(
            "/api/sources/:id",
            put(routes::sources::update_source).delete(routes::sources::delete_source),
        )
        // Directory endpoints
        .route(
            "/api/directory/countries",
            get(routes::directory::list_countries),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iptv_catalog=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();
    let port = config.port;

    tracing::info!("Starting IPTV Catalog v{}", env!("CARGO_PKG_VERSION"));

    // Playlist fetcher + cache
    let fetcher = PlaylistFetcher::new(FetcherOptions {
        timeout: config.fetch_timeout(),
        max_bytes: config.max_playlist_bytes(),
        user_agent: config.user_agent.clone(),
    })?;
    let cache = PlaylistCache::new(Arc::new(fetcher), config.cache_ttl());
    tracing::info!(
        "Playlist cache initialized (ttl {}s)",
        config.cache_ttl().as_secs()
    );

    // Country directory
    let directory = Arc::new(DirectoryClient::new(DirectoryOptions {
        api_url: config.directory_api_url.clone(),
        streams_url: config.directory_streams_url.clone(),
        flags_url: config.flags_base_url.clone(),
        timeout: config.fetch_timeout(),
        user_agent: config.user_agent.clone(),
    })?);

    // Configured sources
    let sources = Arc::new(
        SourceRegistry::load(&config.sources_file, directory.clone(), cache.clone()).await?,
    );

    let catalog = Catalog::new(sources.clone(), cache.clone());

    // Build application state
    let state = Arc::new(AppState {
        config,
        sources,
        cache,
        catalog,
        directory,
        start_time: Instant::now(),
    });

    let app = router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
