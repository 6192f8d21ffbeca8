//! Internal AI routes — queued chat generation and insight.
//!
//! DESIGN
//! ======
//! `POST /ai/chat` is the dispatch hot path: mint a correlation id, offer the
//! job to the bounded queue, and wait on the single-shot reply under the
//! 60-second request deadline. A full queue answers 429 immediately; a dead
//! upstream still answers 200 with the deterministic fallback.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;

use crate::ai::{ChatDispatchError, ChatJob};
use crate::response;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    zodiac_sign: String,
    user_message: String,
}

/// `POST /ai/chat`
pub async fn generate_chat(State(state): State<AppState>, body: Result<Json<ChatRequest>, JsonRejection>) -> Response {
    let Ok(Json(req)) = body else {
        return response::bad_request("Invalid request body", None);
    };
    if req.zodiac_sign.trim().is_empty() || req.user_message.trim().is_empty() {
        return response::bad_request("zodiac_sign and user_message are required", None);
    }

    let job = ChatJob { zodiac_sign: req.zodiac_sign, user_message: req.user_message };
    match crate::ai::dispatch_chat(&state.ai_queue, job).await {
        Ok(reply) if reply.fallback => {
            response::success("AI response generated (fallback)", json!({ "response": reply.text }))
        }
        Ok(reply) => response::success("AI response generated", json!({ "response": reply.text })),
        Err(ChatDispatchError::Busy) => response::too_many_requests("Server is busy, please try again later"),
        Err(ChatDispatchError::Shutdown) => response::service_unavailable("Service is shutting down"),
        Err(ChatDispatchError::Timeout) => response::request_timeout("Request timeout - please try again"),
        Err(ChatDispatchError::Internal) => response::internal_error("Failed to generate AI response"),
    }
}

#[derive(Deserialize)]
pub struct InsightRequest {
    chat_history: String,
}

/// `POST /ai/insight`
pub async fn generate_insight(
    State(state): State<AppState>,
    body: Result<Json<InsightRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return response::bad_request("Invalid request body", None);
    };
    if req.chat_history.trim().is_empty() {
        return response::bad_request("chat_history is required", None);
    }

    let reply = state.ai.generate_insight(&req.chat_history).await;
    if reply.fallback {
        response::success("Insight generated (fallback)", json!({ "insight": reply.text }))
    } else {
        response::success("Insight generated", json!({ "insight": reply.text }))
    }
}
