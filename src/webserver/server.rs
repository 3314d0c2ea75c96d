/// Server lifecycle
///
/// Router assembly, listener bind and graceful shutdown on SIGINT/SIGTERM.
use crate::errors::{TrackerError, TrackerResult};
use crate::logger::{self, LogTag};
use crate::webserver::routes;
use crate::webserver::state::AppState;
use crate::webserver::ws;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

pub async fn serve(state: AppState) -> TrackerResult<()> {
    let port = state.config.port;
    let app = Router::new()
        .nest("/api", routes::api_router())
        .route("/ws", get(ws::connection::ws_handler))
        .layer(CompressionLayer::new())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| TrackerError::bad_request(format!("cannot bind {}: {}", addr, err)))?;

    logger::info(LogTag::Webserver, &format!("listening on {}", addr));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| TrackerError::bad_request(format!("server error: {}", err)))?;

    logger::info(LogTag::Webserver, "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    logger::info(LogTag::Webserver, "shutdown signal received");
}
