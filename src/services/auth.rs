//! Account service — registration, login, token refresh, profile.
//!
//! DESIGN
//! ======
//! Passwords are stored as bcrypt hashes (cost 10). Refresh tokens are JWTs
//! that are additionally persisted with an expiry so they can be revoked and
//! audited; refresh requires both a valid signature and a live stored row.
//! The zodiac sign is derived from date of birth exactly once, at
//! registration, and is immutable afterwards.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::jwt::{TokenManager, TokenType};
use crate::zodiac::ZodiacSign;

/// bcrypt cost factor for password hashes.
const BCRYPT_COST: u32 = 10;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email already exists")]
    EmailTaken,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid or expired token")]
    Token(#[from] crate::jwt::TokenError),
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Public user shape. The password hash never leaves this module.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub display_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub zodiac_sign: String,
    pub bio: String,
    pub avatar_url: String,
    pub total_posts: i32,
    pub friends_count: i32,
    pub created_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = "id, email, full_name, display_name, date_of_birth, gender, zodiac_sign, bio, \
                            avatar_url, total_posts, friends_count, created_at";

#[derive(Debug)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

#[derive(Debug)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

// =============================================================================
// REGISTRATION AND LOGIN
// =============================================================================

/// Create an account and issue the initial token pair.
///
/// # Errors
///
/// `EmailTaken` on a duplicate email; storage and hashing errors otherwise.
pub async fn register(pool: &PgPool, tokens: &TokenManager, input: RegisterInput) -> Result<AuthResponse, AuthError> {
    let zodiac = ZodiacSign::from_date_of_birth(input.date_of_birth);
    let password_hash = bcrypt::hash(&input.password, BCRYPT_COST)?;

    let query = format!(
        "INSERT INTO users (email, password_hash, full_name, display_name, date_of_birth, gender, zodiac_sign)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {USER_COLUMNS}"
    );
    let user = sqlx::query_as::<_, User>(&query)
        .bind(&input.email)
        .bind(&password_hash)
        .bind(&input.full_name)
        .bind(&input.full_name) // display name defaults to full name
        .bind(input.date_of_birth)
        .bind(&input.gender)
        .bind(zodiac.as_str())
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                AuthError::EmailTaken
            } else {
                AuthError::Database(e)
            }
        })?;

    issue_tokens(pool, tokens, user).await
}

/// Verify credentials and issue a fresh token pair.
///
/// # Errors
///
/// `InvalidCredentials` for an unknown email or wrong password.
pub async fn login(pool: &PgPool, tokens: &TokenManager, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
    let query = format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1");
    let row = sqlx::query_as::<_, UserWithHash>(&query)
        .bind(email)
        .fetch_optional(pool)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !bcrypt::verify(password, &row.password_hash)? {
        return Err(AuthError::InvalidCredentials);
    }

    issue_tokens(pool, tokens, row.user).await
}

#[derive(sqlx::FromRow)]
struct UserWithHash {
    #[sqlx(flatten)]
    user: User,
    password_hash: String,
}

async fn issue_tokens(pool: &PgPool, tokens: &TokenManager, user: User) -> Result<AuthResponse, AuthError> {
    let access_token = tokens.generate_access_token(user.id, &user.zodiac_sign)?;
    let refresh_token = tokens.generate_refresh_token(user.id, &user.zodiac_sign)?;

    sqlx::query(
        "INSERT INTO refresh_tokens (user_id, token, expires_at)
         VALUES ($1, $2, now() + INTERVAL '30 days')",
    )
    .bind(user.id)
    .bind(&refresh_token)
    .execute(pool)
    .await?;

    Ok(AuthResponse { access_token, refresh_token, user })
}

/// Exchange a refresh token for a new access token.
///
/// # Errors
///
/// Token errors for a bad signature, expiry, or wrong type; `UserNotFound`
/// when the token is not (or no longer) in the store.
pub async fn refresh_access_token(pool: &PgPool, tokens: &TokenManager, refresh_token: &str) -> Result<String, AuthError> {
    let claims = tokens.verify_typed(refresh_token, TokenType::Refresh)?;

    let stored: Option<(Uuid,)> =
        sqlx::query_as("SELECT user_id FROM refresh_tokens WHERE token = $1 AND expires_at > now()")
            .bind(refresh_token)
            .fetch_optional(pool)
            .await?;
    if stored.is_none() {
        return Err(AuthError::UserNotFound);
    }

    Ok(tokens.generate_access_token(claims.user_id, &claims.zodiac_sign)?)
}

// =============================================================================
// PROFILE
// =============================================================================

/// Fetch a user's profile.
///
/// # Errors
///
/// `UserNotFound` when the id does not resolve.
pub async fn get_profile(pool: &PgPool, user_id: Uuid) -> Result<User, AuthError> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    sqlx::query_as::<_, User>(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AuthError::UserNotFound)
}

/// Apply a partial profile update and return the result.
///
/// # Errors
///
/// `UserNotFound` when the id does not resolve.
pub async fn update_profile(pool: &PgPool, user_id: Uuid, update: ProfileUpdate) -> Result<User, AuthError> {
    sqlx::query(
        "UPDATE users SET
             display_name = COALESCE($2, display_name),
             bio          = COALESCE($3, bio),
             avatar_url   = COALESCE($4, avatar_url),
             updated_at   = now()
         WHERE id = $1",
    )
    .bind(user_id)
    .bind(update.display_name)
    .bind(update.bio)
    .bind(update.avatar_url)
    .execute(pool)
    .await?;

    get_profile(pool, user_id).await
}
