use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,

    // Fetching
    pub fetch_timeout_ms: u64,
    pub max_playlist_size_mb: usize,
    pub user_agent: String,

    // Cache
    pub playlist_cache_ttl_ms: u64,

    // Sources
    pub sources_file: String,

    // Directory
    pub directory_api_url: String,
    pub directory_streams_url: String,
    pub flags_base_url: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            // Server
            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .unwrap_or(3001),

            // Fetching
            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .unwrap_or_else(|_| "15000".to_string())
                .parse()
                .unwrap_or(15_000), // 15 seconds

            max_playlist_size_mb: env::var("MAX_PLAYLIST_SIZE_MB")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),

            // Use VLC user agent to avoid IPTV server blocks
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "VLC/3.0.20 LibVLC/3.0.20".to_string()),

            // Cache
            playlist_cache_ttl_ms: env::var("PLAYLIST_CACHE_TTL_MS")
                .unwrap_or_else(|_| "300000".to_string())
                .parse()
                .unwrap_or(300_000), // 5 minutes

            // Sources
            sources_file: env::var("SOURCES_FILE")
                .unwrap_or_else(|_| "sources.json".to_string()),

            // Directory
            directory_api_url: env::var("DIRECTORY_API_URL")
                .unwrap_or_else(|_| "https://iptv-org.github.io/api".to_string()),
            directory_streams_url: env::var("DIRECTORY_STREAMS_URL")
                .unwrap_or_else(|_| "https://iptv-org.github.io/iptv/countries/".to_string()),
            flags_base_url: env::var("FLAGS_BASE_URL")
                .unwrap_or_else(|_| "https://flagsapi.com/".to_string()),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.playlist_cache_ttl_ms)
    }

    pub fn max_playlist_bytes(&self) -> u64 {
        (self.max_playlist_size_mb as u64) * 1024 * 1024
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
