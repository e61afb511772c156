use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::models::CountriesResponse;
use crate::routes::{api_error, ApiError};
use crate::AppState;

/// GET /api/directory/countries - Countries available for directory sources
pub async fn list_countries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CountriesResponse>, ApiError> {
    let countries = state.directory.countries().await.map_err(|e| {
        tracing::error!("Error fetching IPTV.org countries: {}", e);
        api_error(StatusCode::BAD_GATEWAY, e)
    })?;

    Ok(Json(CountriesResponse {
        total: countries.len(),
        countries,
    }))
}
