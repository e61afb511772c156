use axum::{http::StatusCode, Json};

pub mod catalog;
pub mod directory;
pub mod health;
pub mod sources;

/// Error body returned by every handler
pub type ApiError = (StatusCode, Json<serde_json::Value>);

pub fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.to_string() })))
}
