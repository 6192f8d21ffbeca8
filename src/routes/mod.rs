//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds every HTTP and websocket endpoint under `/api/v1` plus the health
//! probe. The ingress limiter wraps everything except the auth endpoints and
//! the health probe, identifying callers by user id when a bearer token is
//! present and by remote address otherwise.

pub mod ai;
pub mod auth;
pub mod chat;
pub mod friends;
pub mod posts;
pub mod rooms;
pub mod users;

use std::net::SocketAddr;

use axum::Router;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::{get, post, put};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::jwt::TokenType;
use crate::state::AppState;
use crate::{db, response};

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let api = Router::new()
        // Auth (public, exempt from the ingress limiter).
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        // Profile.
        .route("/users/me", get(users::me).put(users::update_me))
        // Friends.
        .route("/friends", get(friends::list))
        .route("/friends/requests", post(friends::send_request))
        .route("/friends/requests/{id}", put(friends::respond))
        .route("/friends/status/{user_id}", get(friends::status))
        // AI chat sessions.
        .route("/chat/sessions", post(chat::create_session).get(chat::list_sessions))
        .route("/chat/sessions/{id}/messages", post(chat::send_message).get(chat::get_messages))
        .route("/chat/sessions/{id}/generate-insight", post(chat::generate_insight))
        // Rooms.
        .route("/rooms", post(rooms::create_room).get(rooms::list_rooms))
        .route("/rooms/{id}", axum::routing::delete(rooms::delete_room))
        .route("/rooms/{id}/ws", get(rooms::join_room))
        // Social feed.
        .route("/posts", get(posts::get_feed).post(posts::publish_post))
        .route("/posts/{id}", get(posts::get_post))
        .route("/posts/{id}/like", post(posts::like_post).delete(posts::unlike_post))
        .route("/posts/{id}/comments", get(posts::get_comments).post(posts::add_comment))
        // Internal AI endpoints (same-origin only; not proxied).
        .route("/ai/chat", post(ai::generate_chat))
        .route("/ai/insight", post(ai::generate_insight))
        .layer(axum::middleware::from_fn_with_state(state.clone(), ingress_limit));

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// INGRESS LIMITER MIDDLEWARE
// =============================================================================

/// Per-principal sliding-window admission. The principal is the authenticated
/// user id when the request carries a valid access token, else the peer
/// address. Auth endpoints are exempt, matching their public grouping.
async fn ingress_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    // Nested routers may see the request with the `/api/v1` prefix stripped.
    let path = request.uri().path();
    let path = path.strip_prefix("/api/v1").unwrap_or(path);
    if path.starts_with("/auth/") {
        return next.run(request).await;
    }

    let identifier = principal(&state, &request).unwrap_or_else(|| addr.ip().to_string());

    if !state.ingress.allow(&identifier) {
        return response::too_many_requests("Rate limit exceeded. Please try again later.");
    }

    next.run(request).await
}

/// Extract a user id from the bearer header or `?token=` query, if valid.
fn principal(state: &AppState, request: &Request) -> Option<String> {
    let token = bearer_token(request).or_else(|| query_token(request))?;
    state
        .tokens
        .verify_typed(&token, TokenType::Access)
        .ok()
        .map(|claims| claims.user_id.to_string())
}

fn bearer_token(request: &Request) -> Option<String> {
    let header = request.headers().get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    header.strip_prefix("Bearer ").map(str::to_string)
}

fn query_token(request: &Request) -> Option<String> {
    let query = request.uri().query()?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .map(str::to_string)
}

// =============================================================================
// HEALTH
// =============================================================================

async fn health(State(state): State<AppState>) -> Response {
    let store = match db::health_check(&state.pool).await {
        Ok(()) => "up",
        Err(_) => "down",
    };
    let body = json!({
        "status": if store == "up" { "healthy" } else { "degraded" },
        "store": store,
        "ai_queue": state.ai_queue.stats(),
        "breaker": state.ai.breaker().state().to_string(),
    });
    response::success("health", body)
}
