//! Profile routes.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::Response;
use serde::Deserialize;

use super::auth::AuthUser;
use crate::response;
use crate::services::auth as auth_svc;
use crate::state::AppState;

/// `GET /users/me`
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> Response {
    match auth_svc::get_profile(&state.pool, auth.user_id).await {
        Ok(user) => response::success("Profile retrieved", user),
        Err(auth_svc::AuthError::UserNotFound) => response::not_found("User not found"),
        Err(e) => {
            tracing::error!(error = %e, "profile fetch failed");
            response::internal_error("Failed to fetch profile")
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    display_name: Option<String>,
    bio: Option<String>,
    avatar_url: Option<String>,
}

/// `PUT /users/me`
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = body else {
        return response::bad_request("Invalid request body", None);
    };

    let update = auth_svc::ProfileUpdate {
        display_name: req.display_name.filter(|v| !v.trim().is_empty()),
        bio: req.bio,
        avatar_url: req.avatar_url,
    };

    match auth_svc::update_profile(&state.pool, auth.user_id, update).await {
        Ok(user) => response::success("Profile updated", user),
        Err(auth_svc::AuthError::UserNotFound) => response::not_found("User not found"),
        Err(e) => {
            tracing::error!(error = %e, "profile update failed");
            response::internal_error("Failed to update profile")
        }
    }
}
