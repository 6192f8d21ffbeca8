//! Auth routes — registration, login, refresh, and the bearer extractor.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::response::Response;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::jwt::{TokenError, TokenType};
use crate::response;
use crate::services::auth as auth_svc;
use crate::state::AppState;

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated principal extracted from the `Authorization: Bearer` header.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user_id: Uuid,
    pub zodiac_sign: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let Some(token) = header.strip_prefix("Bearer ") else {
            return Err(response::unauthorized("Missing or malformed authorization header"));
        };

        let app_state = AppState::from_ref(state);
        match app_state.tokens.verify_typed(token, TokenType::Access) {
            Ok(claims) => Ok(Self { user_id: claims.user_id, zodiac_sign: claims.zodiac_sign }),
            Err(TokenError::Expired) => Err(response::unauthorized("Token has expired")),
            Err(TokenError::WrongType) => Err(response::unauthorized("Invalid token type")),
            Err(TokenError::Invalid) => Err(response::unauthorized("Invalid token")),
        }
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Deserialize)]
pub struct RegisterRequest {
    email: String,
    password: String,
    full_name: String,
    /// `YYYY-MM-DD`.
    date_of_birth: String,
    gender: String,
}

/// `POST /auth/register`
pub async fn register(State(state): State<AppState>, body: Result<Json<RegisterRequest>, JsonRejection>) -> Response {
    let Ok(Json(req)) = body else {
        return response::bad_request("Invalid request body", None);
    };

    if let Some(details) = validate_registration(&req) {
        return response::bad_request("Validation failed", Some(details));
    }
    let Ok(date_of_birth) = NaiveDate::parse_from_str(&req.date_of_birth, "%Y-%m-%d") else {
        return response::bad_request("date_of_birth must be YYYY-MM-DD", None);
    };

    let input = auth_svc::RegisterInput {
        email: req.email,
        password: req.password,
        full_name: req.full_name,
        date_of_birth,
        gender: req.gender,
    };

    match auth_svc::register(&state.pool, &state.tokens, input).await {
        Ok(resp) => response::created("User registered successfully", resp),
        Err(auth_svc::AuthError::EmailTaken) => response::conflict("Email already exists"),
        Err(e) => {
            tracing::error!(error = %e, "registration failed");
            response::internal_error("Failed to register user")
        }
    }
}

fn validate_registration(req: &RegisterRequest) -> Option<serde_json::Value> {
    let mut details = serde_json::Map::new();
    if !req.email.contains('@') {
        details.insert("email".into(), json!("must be a valid email address"));
    }
    if req.password.len() < 8 {
        details.insert("password".into(), json!("must be at least 8 characters"));
    }
    if req.full_name.trim().is_empty() {
        details.insert("full_name".into(), json!("is required"));
    }
    if !matches!(req.gender.as_str(), "male" | "female" | "other") {
        details.insert("gender".into(), json!("must be one of male, female, other"));
    }
    if details.is_empty() { None } else { Some(details.into()) }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

/// `POST /auth/login`
pub async fn login(State(state): State<AppState>, body: Result<Json<LoginRequest>, JsonRejection>) -> Response {
    let Ok(Json(req)) = body else {
        return response::bad_request("Invalid request body", None);
    };

    match auth_svc::login(&state.pool, &state.tokens, &req.email, &req.password).await {
        Ok(resp) => response::success("Login successful", resp),
        Err(auth_svc::AuthError::InvalidCredentials) => response::unauthorized("Invalid email or password"),
        Err(e) => {
            tracing::error!(error = %e, "login failed");
            response::internal_error("Failed to log in")
        }
    }
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    refresh_token: String,
}

/// `POST /auth/refresh`
pub async fn refresh(State(state): State<AppState>, body: Result<Json<RefreshRequest>, JsonRejection>) -> Response {
    let Ok(Json(req)) = body else {
        return response::bad_request("Invalid request body", None);
    };

    match auth_svc::refresh_access_token(&state.pool, &state.tokens, &req.refresh_token).await {
        Ok(access_token) => response::success("Token refreshed", json!({ "access_token": access_token })),
        Err(auth_svc::AuthError::Token(_) | auth_svc::AuthError::UserNotFound) => {
            response::unauthorized("Invalid or expired refresh token")
        }
        Err(e) => {
            tracing::error!(error = %e, "token refresh failed");
            response::internal_error("Failed to refresh token")
        }
    }
}
