/// WebSocket connection handler
///
/// Per-connection lifecycle: upgrade, `connected` greeting, optional legacy
/// `?token=` initial subscription, then the message loop. Inbound frames are
/// `"<mint>,<action>"`; a malformed frame answers `error{message}` and never
/// disturbs the connection's other subscriptions.
use crate::errors::TrackerError;
use crate::logger::{self, short_mint, LogTag};
use crate::webserver::state::AppState;
use crate::webserver::ws::hub::ConnectionId;
use crate::webserver::ws::message::{parse_client_message, ClientAction, ServerEvent};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    /// Legacy initial subscription: `?token=<mint>` behaves exactly like a
    /// first `"<mint>,subscribe"` frame.
    pub token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.token))
}

async fn handle_socket(socket: WebSocket, state: AppState, initial_token: Option<String>) {
    let (conn_id, mut outbound) = state.hub.register().await;
    let (mut sink, mut stream) = socket.split();

    let greeting = ServerEvent::Connected { socket_id: conn_id }.to_frame();
    if sink.send(Message::Text(greeting)).await.is_err() {
        state.hub.unregister(conn_id).await;
        return;
    }

    if let Some(mint) = initial_token {
        handle_subscribe(&state, conn_id, mint.trim()).await;
    }

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        if sink.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_message(&state, conn_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Pings are answered by the protocol layer.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.hub.unregister(conn_id).await;
    logger::debug(LogTag::Hub, &format!("connection {} closed", conn_id));
}

async fn handle_message(state: &AppState, conn_id: ConnectionId, text: &str) {
    match parse_client_message(text) {
        Ok((mint, ClientAction::Subscribe)) => handle_subscribe(state, conn_id, &mint).await,
        Ok((mint, ClientAction::Unsubscribe)) => handle_unsubscribe(state, conn_id, &mint).await,
        Err(message) => {
            state
                .hub
                .send_to(conn_id, ServerEvent::Error { message }.to_frame())
                .await;
        }
    }
}

async fn handle_subscribe(state: &AppState, conn_id: ConnectionId, mint: &str) {
    // Banned mints fail exactly like invalid ones.
    let verdict = if state.scheduler.is_banned(mint).await {
        Err(TrackerError::invalid_mint("mint is banned"))
    } else {
        state.validator.validate(mint).await
    };

    match verdict {
        Ok(()) => {}
        Err(TrackerError::InvalidMint { reason }) => {
            state
                .hub
                .send_to(
                    conn_id,
                    ServerEvent::SubscriptionError {
                        mint: mint.to_string(),
                        message: reason,
                    }
                    .to_frame(),
                )
                .await;
            return;
        }
        Err(err) => {
            // Transient validation trouble; the client may retry.
            state
                .hub
                .send_to(
                    conn_id,
                    ServerEvent::Error {
                        message: format!("validation unavailable: {}", err),
                    }
                    .to_frame(),
                )
                .await;
            return;
        }
    }

    if state.hub.is_subscribed(conn_id, mint).await {
        state
            .hub
            .send_to(
                conn_id,
                ServerEvent::SubscriptionStatus {
                    mint: mint.to_string(),
                    status: "already_subscribed",
                }
                .to_frame(),
            )
            .await;
        return;
    }

    let total_subscriptions = state.hub.add_subscription(conn_id, mint).await;

    // First subscriber for a cold mint: produce an initial snapshot through
    // the scheduler so it cannot race a concurrent tick, then make sure the
    // repeating job exists.
    if state.engine.current_of(mint).await.unwrap_or(None).is_none() {
        state.scheduler.run_once(mint).await;
    }
    if let Err(err) = state.scheduler.enrol(mint).await {
        logger::warning(
            LogTag::Hub,
            &format!("enrol of {} at subscribe failed: {}", short_mint(mint), err),
        );
    }

    if let Ok(Some(snapshot)) = state.engine.current_of(mint).await {
        state
            .hub
            .send_to(conn_id, ServerEvent::PriceUpdate(snapshot).to_frame())
            .await;
    }

    state
        .hub
        .send_to(
            conn_id,
            ServerEvent::SubscriptionSuccess {
                mint: mint.to_string(),
                total_subscriptions,
            }
            .to_frame(),
        )
        .await;
}

async fn handle_unsubscribe(state: &AppState, conn_id: ConnectionId, mint: &str) {
    let total_subscriptions = state.hub.remove_subscription(conn_id, mint).await;
    state
        .hub
        .send_to(
            conn_id,
            ServerEvent::UnsubscriptionSuccess {
                mint: mint.to_string(),
                total_subscriptions,
            }
            .to_frame(),
        )
        .await;
}
