//! Country directory (iptv-org)
//!
//! Turns a country code into a playlist URL. Only used while configuring a
//! source; browsing never talks to the directory.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::Country;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("country '{0}' not found in directory")]
    NotFound(String),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Result of resolving a country code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCountry {
    /// Lowercase country code
    pub code: String,
    pub name: String,
    pub playlist_url: String,
    pub flag_url: String,
}

/// Country code to playlist lookup
#[async_trait]
pub trait CountryDirectory: Send + Sync {
    async fn resolve(&self, country_code: &str) -> Result<ResolvedCountry, ResolveError>;
}

/// Raw entry of countries.json
#[derive(Debug, Deserialize)]
struct CountryRecord {
    code: Option<String>,
    name: Option<String>,
}

/// Directory endpoints
#[derive(Debug, Clone)]
pub struct DirectoryOptions {
    /// Base of the API, `countries.json` lives below it
    pub api_url: String,
    /// Per-country playlists: `{streams_url}{code}.m3u`
    pub streams_url: String,
    /// Flag images: `{flags_url}{CODE}/flat/64.png`
    pub flags_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

/// HTTP client for the iptv-org directory
pub struct DirectoryClient {
    http: Client,
    options: DirectoryOptions,
}

impl DirectoryClient {
    pub fn new(options: DirectoryOptions) -> Result<Self, ResolveError> {
        let http = Client::builder()
            .user_agent(&options.user_agent)
            .timeout(options.timeout)
            .build()
            .map_err(|e| ResolveError::Unavailable(e.to_string()))?;

        Ok(Self { http, options })
    }

    fn countries_url(&self) -> String {
        format!("{}/countries.json", self.options.api_url.trim_end_matches('/'))
    }

    pub fn playlist_url(&self, code: &str) -> String {
        format!("{}{}.m3u", self.options.streams_url, code.to_lowercase())
    }

    pub fn flag_url(&self, code: &str) -> String {
        format!("{}{}/flat/64.png", self.options.flags_url, code.to_uppercase())
    }

    async fn fetch_records(&self) -> Result<Vec<CountryRecord>, ResolveError> {
        let url = self.countries_url();
        tracing::debug!("Fetching countries from: {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolveError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Unavailable(format!("HTTP {}", status.as_u16())));
        }

        response
            .json::<Vec<CountryRecord>>()
            .await
            .map_err(|e| ResolveError::Unavailable(e.to_string()))
    }

    /// All countries with both a code and a name, sorted by display label
    pub async fn countries(&self) -> Result<Vec<Country>, ResolveError> {
        let mut countries: Vec<Country> = self
            .fetch_records()
            .await?
            .into_iter()
            .filter_map(|record| match (record.code, record.name) {
                (Some(code), Some(name)) if !code.is_empty() && !name.is_empty() => {
                    Some(Country {
                        label: format!("{}{}", flag_emoji(&code), name),
                        code: code.to_lowercase(),
                        name,
                    })
                }
                _ => None,
            })
            .collect();

        countries.sort_by(|a, b| a.label.cmp(&b.label));
        tracing::debug!("Fetched {} countries", countries.len());
        Ok(countries)
    }
}

#[async_trait]
impl CountryDirectory for DirectoryClient {
    async fn resolve(&self, country_code: &str) -> Result<ResolvedCountry, ResolveError> {
        let code = country_code.trim().to_lowercase();
        if code.is_empty() {
            return Err(ResolveError::NotFound(country_code.to_string()));
        }

        let country = self
            .countries()
            .await?
            .into_iter()
            .find(|c| c.code == code)
            .ok_or_else(|| ResolveError::NotFound(code.clone()))?;

        Ok(ResolvedCountry {
            playlist_url: self.playlist_url(&code),
            flag_url: self.flag_url(&code),
            code,
            name: country.name,
        })
    }
}

/// Two-letter country code to a regional-indicator flag plus a space.
/// Anything else yields an empty string.
pub fn flag_emoji(code: &str) -> String {
    let upper = code.to_ascii_uppercase();
    if upper.len() != 2 || !upper.bytes().all(|b| b.is_ascii_uppercase()) {
        return String::new();
    }

    let mut flag: String = upper
        .bytes()
        .filter_map(|b| char::from_u32(0x1F1E6 + u32::from(b - b'A')))
        .collect();
    flag.push(' ');
    flag
}
