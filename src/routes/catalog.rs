use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::{BrowseNode, PlayMedia, SourceListing};
use crate::routes::{api_error, ApiError};
use crate::services::catalog::CatalogError;
use crate::AppState;

fn catalog_error(err: CatalogError) -> ApiError {
    match err {
        CatalogError::SourceNotFound(_) | CatalogError::ChannelNotFound { .. } => {
            api_error(StatusCode::NOT_FOUND, err)
        }
        CatalogError::SourceUnavailable {
            ref source_id,
            ref cause,
            ..
        } => {
            tracing::error!(source_id = %source_id, cause = %cause, "browse failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({
                    "error": err.to_string(),
                    "sourceId": source_id,
                    "cause": cause.to_string(),
                })),
            )
        }
    }
}

/// GET /api/catalog - Root node listing configured sources
pub async fn get_root(State(state): State<Arc<AppState>>) -> Json<BrowseNode> {
    Json(state.catalog.root().await)
}

/// GET /api/catalog/:source_id - Channels of one source
pub async fn browse_source(
    State(state): State<Arc<AppState>>,
    Path(source_id): Path<String>,
) -> Result<Json<SourceListing>, ApiError> {
    state
        .catalog
        .browse(&source_id)
        .await
        .map(Json)
        .map_err(catalog_error)
}

/// GET /api/catalog/:source_id/:index/play - Playback URL of a channel
pub async fn play_channel(
    State(state): State<Arc<AppState>>,
    Path((source_id, index)): Path<(String, usize)>,
) -> Result<Json<PlayMedia>, ApiError> {
    state
        .catalog
        .resolve_playback(&source_id, index)
        .await
        .map(Json)
        .map_err(catalog_error)
}
