/// Health endpoint
///
/// Probes both stores; either failing makes the service unhealthy (503).
use crate::webserver::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.db.health_check();
    let redis = state.cache.ping().await;

    match (&database, &redis) {
        (Ok(()), Ok(())) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "database": "up",
                "redis": "up",
            })),
        ),
        _ => {
            let error = database
                .err()
                .map(|err| err.to_string())
                .or_else(|| redis.err().map(|err| err.to_string()))
                .unwrap_or_default();
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "error": error,
                })),
            )
        }
    }
}
