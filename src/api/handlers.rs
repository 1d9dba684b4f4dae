//! HTTP request handlers

use super::assets::get_index_html;
use super::sse::sse_stream;
use super::types::{
    CancelResponse, ChatRequest, DetailResponse, MessageResponse, StateResponse, TurnResponse,
    VoiceTurnRequest,
};
use super::ws::push_events;
use super::AppState;
use crate::capture::CaptureError;
use crate::policy;
use crate::turn::TurnResult;
use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Root serves the single-page UI
        .route("/", get(serve_ui))
        // Turns
        .route("/api/chat", post(chat))
        .route("/api/voice-turn", post(voice_turn))
        // State
        .route("/api/state", get(get_state))
        .route("/api/cancel", post(cancel))
        // Push streams
        .route("/ws", get(websocket))
        .route("/api/events", get(events))
        // Synthesized clips
        .route("/audio/:id", get(serve_audio))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// UI
// ============================================================

async fn serve_ui() -> impl IntoResponse {
    match get_index_html() {
        Some(content) => Html(content).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Html("<h1>404 - UI not found</h1>".to_string()),
        )
            .into_response(),
    }
}

// ============================================================
// Turns
// ============================================================

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Json<TurnResponse> {
    let result = state.assistant.chat(&req.text).await;
    play_in_background(&state, &result).await;
    Json(TurnResponse::from(&result))
}

async fn voice_turn(
    State(state): State<AppState>,
    Json(req): Json<VoiceTurnRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    let result = state
        .assistant
        .voice_turn(req.mode, req.timeout_ms, req.session_id)
        .await?;
    play_in_background(&state, &result).await;
    Ok(Json(TurnResponse::from(&result)))
}

/// Claim the device now so a follow-up request sees the conflict, then play
/// without holding up the response
async fn play_in_background(state: &AppState, result: &TurnResult) {
    if let Some(playback) = state.assistant.start_playback(result).await {
        tokio::spawn(async move {
            let _ = playback.run().await;
        });
    }
}

// ============================================================
// State
// ============================================================

async fn get_state(State(state): State<AppState>) -> Json<StateResponse> {
    Json(StateResponse {
        state: state.assistant.state(),
    })
}

async fn cancel(State(state): State<AppState>) -> Json<CancelResponse> {
    let session_id = state.assistant.interrupt();
    Json(CancelResponse {
        ok: true,
        session_id,
    })
}

// ============================================================
// Push Streams
// ============================================================

async fn websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    // Subscribe before reading the state so nothing falls in between
    let rx = state.assistant.subscribe();
    let current = state.assistant.state();
    ws.on_upgrade(move |socket| push_events(socket, current, rx))
}

async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.assistant.subscribe();
    sse_stream(state.assistant.state(), rx)
}

// ============================================================
// Audio
// ============================================================

async fn serve_audio(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let path = state
        .store
        .path_for(&id)
        .ok_or_else(|| AppError::NotFound(format!("No clip {id}")))?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::NotFound(format!("Clip unreadable: {e}")))?;
    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    Ok((
        [(header::CONTENT_TYPE, mime.to_string())],
        Body::from(bytes),
    )
        .into_response())
}

async fn get_version() -> &'static str {
    concat!("rico ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    NoSpeech,
    Conflict(String),
    Unavailable(String),
    NotFound(String),
}

impl From<CaptureError> for AppError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::NoSpeech => AppError::NoSpeech,
            CaptureError::PlaybackInProgress => AppError::Conflict(e.to_string()),
            CaptureError::Busy | CaptureError::Failed(_) | CaptureError::Cancelled => {
                tracing::warn!(error = %e, "Voice turn failed");
                AppError::Unavailable(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = |status: StatusCode, message: String| {
            (status, Json(MessageResponse { message })).into_response()
        };
        match self {
            AppError::NoSpeech => message(
                StatusCode::UNPROCESSABLE_ENTITY,
                policy::NO_SPEECH_MESSAGE.to_string(),
            ),
            AppError::Conflict(detail) => {
                (StatusCode::CONFLICT, Json(DetailResponse { detail })).into_response()
            }
            AppError::Unavailable(msg) => message(StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::NotFound(msg) => message(StatusCode::NOT_FOUND, msg),
        }
    }
}
