//! Chat routes — sessions, messages, insight.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::ai::ChatDispatchError;
use crate::response;
use crate::services::chat as chat_svc;
use crate::services::chat::ChatError;
use crate::state::AppState;

fn error_response(e: ChatError) -> Response {
    match e {
        ChatError::SessionNotFound => response::not_found("Chat session not found"),
        ChatError::NotOwner => response::forbidden("Session belongs to another user"),
        ChatError::EmptySession => response::bad_request("No messages in session", None),
        ChatError::Dispatch(ChatDispatchError::Busy) => {
            response::too_many_requests("Server is busy, please try again later")
        }
        ChatError::Dispatch(ChatDispatchError::Shutdown) => response::service_unavailable("Service is shutting down"),
        ChatError::Dispatch(ChatDispatchError::Timeout) => response::request_timeout("Request timeout - please try again"),
        ChatError::Dispatch(ChatDispatchError::Internal) => response::internal_error("Failed to generate AI response"),
        ChatError::Database(e) => {
            tracing::error!(error = %e, "chat operation failed");
            response::internal_error("Chat operation failed")
        }
    }
}

#[derive(Deserialize, Default)]
pub struct CreateSessionRequest {
    title: Option<String>,
}

/// `POST /chat/sessions`
pub async fn create_session(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Response {
    // An absent body is fine; the session just gets the default title.
    let req = body.map(|Json(r)| r).unwrap_or_default();

    match chat_svc::create_session(&state.pool, auth.user_id, req.title).await {
        Ok(session) => response::created("Chat session created", session),
        Err(e) => error_response(e),
    }
}

/// `GET /chat/sessions`
pub async fn list_sessions(State(state): State<AppState>, auth: AuthUser) -> Response {
    match chat_svc::list_sessions(&state.pool, auth.user_id).await {
        Ok(sessions) => response::success("Sessions retrieved", sessions),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    message: String,
}

/// `POST /chat/sessions/{id}/messages`
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return response::bad_request("Invalid request body", None);
    };
    if req.message.trim().is_empty() {
        return response::bad_request("message is required", None);
    }

    match chat_svc::send_message(&state.pool, &state.ai_queue, session_id, auth.user_id, &auth.zodiac_sign, &req.message)
        .await
    {
        Ok(pair) if pair.fallback => response::success("Message sent (AI fallback)", pair),
        Ok(pair) => response::success("Message sent", pair),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct MessagesQuery {
    cursor: Option<String>,
    limit: Option<i64>,
}

/// `GET /chat/sessions/{id}/messages?cursor=&limit=`
pub async fn get_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Response {
    match chat_svc::get_messages(&state.pool, session_id, auth.user_id, query.cursor.as_deref(), query.limit).await {
        Ok(page) => {
            let meta = response::Meta {
                has_more: page.next_cursor.is_some(),
                next_cursor: page.next_cursor,
                limit: Some(page.limit),
                ..response::Meta::default()
            };
            response::success_with_meta("Messages retrieved", page.messages, meta)
        }
        Err(e) => error_response(e),
    }
}

/// `POST /chat/sessions/{id}/generate-insight`
pub async fn generate_insight(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<Uuid>,
) -> Response {
    match chat_svc::generate_insight(&state.pool, &state.ai, session_id, auth.user_id).await {
        Ok(reply) if reply.fallback => {
            response::success("Insight generated (fallback)", json!({ "insight": reply.text }))
        }
        Ok(reply) => response::success("Insight generated", json!({ "insight": reply.text })),
        Err(e) => error_response(e),
    }
}
