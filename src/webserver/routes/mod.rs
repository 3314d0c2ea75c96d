//! REST routes under `/api`

pub mod dashboard;
pub mod health;
pub mod metrics;
pub mod tokens;

use crate::errors::TrackerError;
use crate::webserver::state::AppState;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(metrics::routes())
        .merge(tokens::routes())
        .merge(dashboard::routes())
}

/// Translate error kinds into HTTP codes with a `{"error": ...}` body.
pub struct ApiError(pub TrackerError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TrackerError::BadRequest(_) | TrackerError::InvalidMint { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        ApiError(err)
    }
}
