//! Social feed routes — posts, likes, comments. Reads are public.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;

use super::auth::AuthUser;
use crate::response;
use crate::services::auth as auth_svc;
use crate::services::social;
use crate::services::social::SocialError;
use crate::state::AppState;

fn error_response(e: SocialError) -> Response {
    match e {
        SocialError::PostNotFound => response::not_found("Post not found"),
        SocialError::AlreadyLiked => response::conflict("Post already liked"),
        SocialError::NotLiked => response::not_found("Post not liked"),
        SocialError::ParentNotFound => response::bad_request("Parent comment not found", None),
        SocialError::Database(e) => {
            tracing::error!(error = %e, "social operation failed");
            response::internal_error("Social operation failed")
        }
    }
}

// =============================================================================
// POSTS
// =============================================================================

#[derive(Deserialize)]
pub struct PublishPostRequest {
    title: String,
    content: String,
    #[serde(default)]
    mood_tags: Vec<String>,
}

/// `POST /posts`
pub async fn publish_post(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<PublishPostRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return response::bad_request("Invalid request body", None);
    };
    if req.title.trim().is_empty() || req.content.trim().is_empty() {
        return response::bad_request("title and content are required", None);
    }

    match social::publish_post(&state.pool, auth.user_id, &auth.zodiac_sign, &req.title, &req.content, req.mood_tags)
        .await
    {
        Ok(post) => response::created("Post published", post),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct FeedQueryParams {
    cursor: Option<String>,
    limit: Option<i64>,
    zodiac: Option<String>,
    mood: Option<String>,
    sort: Option<String>,
}

/// `GET /posts` — public feed.
pub async fn get_feed(State(state): State<AppState>, Query(params): Query<FeedQueryParams>) -> Response {
    let query = social::FeedQuery {
        cursor: params.cursor,
        limit: params.limit,
        zodiac: params.zodiac,
        mood: params.mood,
        sort: params.sort,
    };
    match social::get_feed(&state.pool, query).await {
        Ok(page) => {
            let meta = response::Meta {
                has_more: page.next_cursor.is_some(),
                next_cursor: page.next_cursor,
                limit: Some(page.limit),
                ..response::Meta::default()
            };
            response::success_with_meta("Feed retrieved", page.posts, meta)
        }
        Err(e) => error_response(e),
    }
}

/// `GET /posts/{id}` — public.
pub async fn get_post(State(state): State<AppState>, Path(post_id): Path<i64>) -> Response {
    match social::get_post(&state.pool, post_id).await {
        Ok(post) => response::success("Post retrieved", post),
        Err(e) => error_response(e),
    }
}

// =============================================================================
// LIKES
// =============================================================================

/// `POST /posts/{id}/like`
pub async fn like_post(State(state): State<AppState>, auth: AuthUser, Path(post_id): Path<i64>) -> Response {
    match social::like_post(&state.pool, post_id, auth.user_id).await {
        Ok(()) => response::success("Post liked", json!({})),
        Err(e) => error_response(e),
    }
}

/// `DELETE /posts/{id}/like`
pub async fn unlike_post(State(state): State<AppState>, auth: AuthUser, Path(post_id): Path<i64>) -> Response {
    match social::unlike_post(&state.pool, post_id, auth.user_id).await {
        Ok(()) => response::success("Post unliked", json!({})),
        Err(e) => error_response(e),
    }
}

// =============================================================================
// COMMENTS
// =============================================================================

#[derive(Deserialize)]
pub struct AddCommentRequest {
    content: String,
    parent_id: Option<i64>,
}

/// `POST /posts/{id}/comments`
pub async fn add_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(post_id): Path<i64>,
    body: Result<Json<AddCommentRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return response::bad_request("Invalid request body", None);
    };
    if req.content.trim().is_empty() {
        return response::bad_request("content is required", None);
    }

    // Display name is denormalized onto the comment row.
    let username = match auth_svc::get_profile(&state.pool, auth.user_id).await {
        Ok(user) => user.display_name,
        Err(e) => {
            tracing::error!(error = %e, "comment author lookup failed");
            return response::internal_error("Failed to add comment");
        }
    };

    match social::add_comment(&state.pool, post_id, auth.user_id, &username, &req.content, req.parent_id).await {
        Ok(comment) => response::created("Comment added", comment),
        Err(e) => error_response(e),
    }
}

/// `GET /posts/{id}/comments` — public.
pub async fn get_comments(State(state): State<AppState>, Path(post_id): Path<i64>) -> Response {
    match social::get_comments(&state.pool, post_id).await {
        Ok(comments) => response::success("Comments retrieved", comments),
        Err(e) => error_response(e),
    }
}
