use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::{AddCountryRequest, AddCustomRequest, Source, SourcesResponse, UpdateSourceRequest};
use crate::routes::{api_error, ApiError};
use crate::services::directory::ResolveError;
use crate::services::sources::SourceError;
use crate::AppState;

fn source_error(err: SourceError) -> ApiError {
    let status = match &err {
        SourceError::NotFound(_) => StatusCode::NOT_FOUND,
        SourceError::InvalidUrl(_) | SourceError::InvalidName | SourceError::UrlNotEditable(_) => {
            StatusCode::BAD_REQUEST
        }
        SourceError::Resolve(ResolveError::NotFound(_)) => StatusCode::BAD_REQUEST,
        SourceError::Resolve(ResolveError::Unavailable(_)) => StatusCode::BAD_GATEWAY,
        SourceError::Persist(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!("Source configuration failed: {}", err);
    } else {
        tracing::warn!("Source configuration rejected: {}", err);
    }
    api_error(status, err)
}

/// GET /api/sources - Configured sources in configuration order
pub async fn list_sources(State(state): State<Arc<AppState>>) -> Json<SourcesResponse> {
    let sources = state.sources.list().await;
    Json(SourcesResponse {
        total: sources.len(),
        sources,
    })
}

/// POST /api/sources/country - Add a source from the country directory
pub async fn add_country_source(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddCountryRequest>,
) -> Result<(StatusCode, Json<Source>), ApiError> {
    let source = state
        .sources
        .add_country(&payload.country_code)
        .await
        .map_err(source_error)?;
    Ok((StatusCode::CREATED, Json(source)))
}

/// POST /api/sources/custom - Add a source with a custom playlist URL
pub async fn add_custom_source(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddCustomRequest>,
) -> Result<(StatusCode, Json<Source>), ApiError> {
    let source = state
        .sources
        .add_custom(&payload.url, payload.name.as_deref())
        .await
        .map_err(source_error)?;
    Ok((StatusCode::CREATED, Json(source)))
}

/// PUT /api/sources/:id - Rename a source (and change its URL if custom)
pub async fn update_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateSourceRequest>,
) -> Result<Json<Source>, ApiError> {
    state
        .sources
        .update(&id, &payload.display_name, payload.playlist_url.as_deref())
        .await
        .map(Json)
        .map_err(source_error)
}

/// DELETE /api/sources/:id - Remove a source and its cached playlist
pub async fn delete_source(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Source>, ApiError> {
    state.sources.remove(&id).await.map(Json).map_err(source_error)
}
