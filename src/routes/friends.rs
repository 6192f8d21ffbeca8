//! Friend routes — requests, responses, listing, status.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::auth::AuthUser;
use crate::response;
use crate::services::friendship;
use crate::services::friendship::FriendshipError;
use crate::state::AppState;

fn error_response(e: FriendshipError) -> Response {
    match e {
        FriendshipError::AlreadyFriends => response::conflict("Already friends"),
        FriendshipError::RequestNotFound => response::not_found("Friend request not found"),
        FriendshipError::NotReceiver => response::forbidden("Only the receiver can respond to this request"),
        FriendshipError::SelfRequest => response::bad_request("Cannot send a friend request to yourself", None),
        FriendshipError::Database(e) => {
            tracing::error!(error = %e, "friendship operation failed");
            response::internal_error("Friendship operation failed")
        }
    }
}

#[derive(Deserialize)]
pub struct SendRequestBody {
    target_user_id: Uuid,
}

/// `POST /friends/requests`
pub async fn send_request(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<SendRequestBody>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return response::bad_request("Invalid request body", None);
    };

    match friendship::send_request(&state.pool, auth.user_id, req.target_user_id).await {
        Ok(request) => response::created("Friend request sent", request),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
pub struct RespondBody {
    action: String,
}

/// `PUT /friends/requests/{id}` with body `{action: "accept"|"reject"}`.
pub async fn respond(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<Uuid>,
    body: Result<Json<RespondBody>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return response::bad_request("Invalid request body", None);
    };

    let result = match req.action.as_str() {
        "accept" => friendship::accept_request(&state.pool, request_id, auth.user_id).await,
        "reject" => friendship::reject_request(&state.pool, request_id, auth.user_id).await,
        _ => return response::bad_request("action must be \"accept\" or \"reject\"", None),
    };

    match result {
        Ok(()) => response::success(
            if req.action == "accept" { "Friend request accepted" } else { "Friend request rejected" },
            json!({}),
        ),
        Err(e) => error_response(e),
    }
}

/// `GET /friends`
pub async fn list(State(state): State<AppState>, auth: AuthUser) -> Response {
    match friendship::get_friends(&state.pool, auth.user_id).await {
        Ok(friends) => {
            let count = friends.len();
            response::success("Friends retrieved", json!({ "friends": friends, "count": count }))
        }
        Err(e) => error_response(e),
    }
}

/// `GET /friends/status/{user_id}`
pub async fn status(State(state): State<AppState>, auth: AuthUser, Path(user_id): Path<Uuid>) -> Response {
    match friendship::status(&state.pool, auth.user_id, user_id).await {
        Ok(status) => response::success("Friendship status retrieved", json!({ "status": status })),
        Err(e) => error_response(e),
    }
}
