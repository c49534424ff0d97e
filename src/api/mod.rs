// HTTP API routes (player registration/login, SMS webhook, metrics).

pub mod ws;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::ai::CompletionProvider;
use crate::db::Database;
use crate::metrics;
use crate::npc::NpcDirectory;
use crate::sms;
use crate::ws::MessageRouter;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterPlayerRequest {
    pub unity_id: String,
    pub phone_number: String,
}

#[derive(Deserialize)]
pub struct LoginPlayerRequest {
    pub unity_id: String,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub npcs: Arc<NpcDirectory>,
    pub provider: Arc<dyn CompletionProvider>,
    pub chat_router: Arc<MessageRouter>,
    pub history_window: i64,
}

// ── Error helpers ─────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

fn internal_error(e: sqlx::Error) -> impl IntoResponse {
    tracing::error!("Database error: {e}");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(
    db: Arc<Database>,
    npcs: Arc<NpcDirectory>,
    provider: Arc<dyn CompletionProvider>,
    history_window: i64,
    event_window: i64,
) -> Router {
    let chat_router = Arc::new(MessageRouter::new(
        db.clone(),
        npcs.clone(),
        provider.clone(),
        history_window,
        event_window,
    ));
    let state = AppState {
        db,
        npcs,
        provider,
        chat_router,
        history_window,
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/register", post(register_player))
        .route("/login", post(login_player))
        .route("/sms/receive", post(sms::receive_sms))
        .route("/metrics", get(get_metrics))
        .route("/ws", get(ws::ws_chat))
        .with_state(state)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "npc-backend" }))
}

async fn register_player(
    State(state): State<AppState>,
    Json(req): Json<RegisterPlayerRequest>,
) -> impl IntoResponse {
    if req.unity_id.is_empty() || req.phone_number.is_empty() {
        return json_error(
            StatusCode::BAD_REQUEST,
            "unity_id and phone_number are required",
        )
        .into_response();
    }

    let phone_number = sms::normalize_number(&req.phone_number);

    match state.db.create_player(&req.unity_id, &phone_number).await {
        Ok(player) => (
            StatusCode::CREATED,
            Json(json!({ "id": player.unity_id, "message": "player registered" })),
        )
            .into_response(),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("UNIQUE") {
                json_error(
                    StatusCode::CONFLICT,
                    "Unity ID or phone number already registered",
                )
                .into_response()
            } else {
                internal_error(e).into_response()
            }
        }
    }
}

async fn login_player(
    State(state): State<AppState>,
    Json(req): Json<LoginPlayerRequest>,
) -> impl IntoResponse {
    if req.unity_id.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "unity_id is required").into_response();
    }

    match state.db.get_player_by_unity_id(&req.unity_id).await {
        Ok(Some(player)) => (
            StatusCode::OK,
            Json(json!({ "id": player.unity_id, "message": "login successful" })),
        )
            .into_response(),
        Ok(None) => json_error(StatusCode::UNAUTHORIZED, "Invalid unity id").into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn get_metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}
