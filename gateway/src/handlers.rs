use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{error, info};

use council_core::ToolDefinition;

use crate::api::{ApiError, ChatRequest, ChatResponse, JsonBody};
use crate::AppState;

pub async fn health_check() -> &'static str {
    "Council Gateway: Operational"
}

// The menu of local functions the agents may call
pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolDefinition>> {
    Json(state.router.runtime().registry().definitions())
}

// The Orchestrator Handler
pub async fn chat(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    let (session_id, session) = state
        .sessions
        .resume_or_start(&state.router, payload.session_id.as_deref())
        .await?;
    let mut session = session.lock().await;
    info!(session_id = %session_id, turn = session.turns() + 1, "Chat turn received");

    let outcome = state.router.route(&mut session, message).await.map_err(|e| {
        error!(session_id = %session_id, "Chat turn failed: {}", e);
        e
    })?;

    Ok(Json(ChatResponse {
        session_id,
        route: outcome.route,
        label: outcome.label,
        reply: outcome.reply,
    }))
}

pub async fn end_chat(State(state): State<AppState>, Path(session_id): Path<String>) -> StatusCode {
    if state.sessions.remove(&session_id).await {
        info!(session_id = %session_id, "Session closed");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
