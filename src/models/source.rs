use serde::{Deserialize, Serialize};

/// How a source's playlist URL was obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SourceKind {
    /// Resolved from the country directory; the URL is fixed
    #[serde(rename_all = "camelCase")]
    Directory { country_code: String },
    /// User supplied URL; editable through reconfiguration
    Custom,
}

/// Configured playlist origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    pub display_name: String,
    pub playlist_url: String,
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl Source {
    pub fn is_custom(&self) -> bool {
        matches!(self.kind, SourceKind::Custom)
    }
}

/// Country entry from the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Country {
    pub code: String,
    pub name: String,
    /// Flag emoji followed by the name, for pickers
    pub label: String,
}

/// Request to add a directory (country) source
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCountryRequest {
    pub country_code: String,
}

/// Request to add a custom URL source
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCustomRequest {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Request to reconfigure a source
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSourceRequest {
    pub display_name: String,
    #[serde(default)]
    pub playlist_url: Option<String>,
}

/// Sources list response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesResponse {
    pub sources: Vec<Source>,
    pub total: usize,
}

/// Countries list response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountriesResponse {
    pub countries: Vec<Country>,
    pub total: usize,
}
