/// Dashboard manifest
use crate::webserver::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new().route("/dashboard/info", get(info))
}

async fn info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "mintstream",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.env,
        "startedAt": state.startup_time,
        "endpoints": {
            "health": "/api/health",
            "metrics": "/api/metrics",
            "tokens": "/api/tokens?page=1&limit=20",
            "tokenMetrics": "/api/tokens/:mint/metrics?window=1h",
            "topHolders": "/api/tokens/:mint/holders/top?limit=10",
            "history": "/api/tokens/:mint/history?window=5m",
        },
        "websocket": {
            "path": "/ws",
            "usage": "send \"<mint>,subscribe\" or \"<mint>,unsubscribe\"; legacy ?token=<mint> also accepted",
        },
    }))
}
