//! Chat API endpoint — the conversational interface to the orchestrator.
//!
//! `POST /api/v1/chat` with `{message, conversation_id?}` streams the
//! agent's events as SSE. Each frame is one JSON object with a stable
//! `type` field: `thinking | tool_call | action | message | todo_update |
//! error`. Client disconnects cancel the running turn.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_util::stream::Stream;
use serde::Deserialize;
use serde_json::json;

use crate::runtime::cancel::{CancelMap, CancelToken};
use crate::runtime::{run_turn, TurnEvent, TurnInput};
use crate::state::AppState;

use super::auth::AuthenticatedUser;

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

pub async fn chat_stream(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChatRequestBody>,
) -> Response {
    let message = body.message.trim().to_string();
    if message.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": "Mensagem não pode estar vazia." })),
        )
            .into_response();
    }

    tracing::info!(user_id = %user.id, preview = %message.chars().take(50).collect::<String>(),
        "chat turn requested");

    // One turn per user at a time; a second request waits its turn.
    let permit = match state.session_locks.acquire(&user.id).await {
        Ok(permit) => permit,
        Err(_) => {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "detail": "Já existe um pedido em curso." })),
            )
                .into_response();
        }
    };

    let cancel = state.cancel_map.register(&user.id);
    let input = TurnInput {
        user_id: user.id.clone(),
        conversation_id: body.conversation_id,
        message,
    };

    let rx = run_turn(state.clone(), input, cancel.clone());
    let stream = make_sse_stream(rx, permit, cancel, state.cancel_map.clone(), user.id);

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Cancels the turn when the SSE stream is dropped (client disconnect) and
/// releases the session's cancel-map slot either way.
struct TurnGuard {
    cancel: CancelToken,
    cancel_map: Arc<CancelMap>,
    session_key: String,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.cancel_map.remove(&self.session_key);
    }
}

fn make_sse_stream(
    mut rx: tokio::sync::mpsc::Receiver<TurnEvent>,
    permit: tokio::sync::OwnedSemaphorePermit,
    cancel: CancelToken,
    cancel_map: Arc<CancelMap>,
    session_key: String,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        let _guard = TurnGuard { cancel, cancel_map, session_key };
        let _permit = permit;
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(data));
        }
        // Dropping _guard cancels a turn the client abandoned; a finished
        // turn has already closed the channel and the cancel is a no-op.
    }
}

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": "renova-chat" }))
}
