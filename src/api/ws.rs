// WebSocket handler for the NPC chat channel.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::AppState;
use crate::metrics;
use crate::ws::MessageRouter;

#[derive(Deserialize)]
pub struct WsParams {
    pub unity_id: String,
}

/// WebSocket upgrade for the chat channel. The caller-supplied identity is
/// checked against the player table before the upgrade completes; unknown
/// identities never get a connection.
pub async fn ws_chat(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.db.get_player_by_unity_id(&params.unity_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unknown player" })),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Database error during session auth: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response();
        }
    }

    let chat_router = state.chat_router.clone();
    ws.on_upgrade(move |socket| handle_session(socket, chat_router, params.unity_id))
        .into_response()
}

/// One session per connection: read an envelope, route it, write the
/// response, repeat. Responses go out in request order; a benign close
/// ends the loop silently, any other read error is logged first.
async fn handle_session(mut socket: WebSocket, chat_router: Arc<MessageRouter>, unity_id: String) {
    metrics::CONNECTED_SESSIONS.inc();
    tracing::info!("chat session opened for {unity_id}");

    loop {
        let message = match socket.recv().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                tracing::warn!("read error for {unity_id}: {e}");
                break;
            }
            None => break,
        };

        match message {
            Message::Text(text) => {
                let response = chat_router.route_text(&text).await;
                if socket
                    .send(Message::Text(response.to_text().into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Message::Close(_) => break,
            // binary/ping/pong frames carry no envelopes
            _ => {}
        }
    }

    metrics::CONNECTED_SESSIONS.dec();
    tracing::info!("chat session closed for {unity_id}");
}
