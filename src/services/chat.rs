//! Chat service — AI sessions, messages, and insight generation.
//!
//! DESIGN
//! ======
//! Sending a message persists the user's line, obtains the AI reply through
//! the dispatch queue (so chat traffic shares the same admission control and
//! pacing as the internal AI endpoints), persists the reply, and returns the
//! pair. Messages expire after 48 hours; reads filter on `expires_at`.
//!
//! Pagination is cursor-based: the cursor is the boundary message id, pages
//! run newest-first, and one extra row is fetched to decide `has_more`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::ai::{AiClient, ChatDispatchError, ChatJob, GeneratedReply};
use crate::queue::RequestQueue;

const DEFAULT_PAGE_LIMIT: i64 = 20;
const MAX_PAGE_LIMIT: i64 = 50;

/// Message sender labels on the wire.
pub const SENDER_USER: &str = "USER";
pub const SENDER_AI: &str = "AI";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat session not found")]
    SessionNotFound,
    #[error("session belongs to another user")]
    NotOwner,
    #[error("no messages in session")]
    EmptySession,
    #[error(transparent)]
    Dispatch(#[from] ChatDispatchError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Result of sending one chat message.
#[derive(Debug, Serialize)]
pub struct MessagePair {
    pub user_message: Message,
    pub ai_message: Message,
    /// True when the AI line came from the fallback table.
    #[serde(skip)]
    pub fallback: bool,
}

/// One page of messages, newest first.
#[derive(Debug)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub next_cursor: Option<String>,
    pub limit: i64,
}

// =============================================================================
// SESSIONS
// =============================================================================

/// Create a chat session. An empty title gets a dated default.
///
/// # Errors
///
/// Storage errors only.
pub async fn create_session(pool: &PgPool, user_id: Uuid, title: Option<String>) -> Result<ChatSession, ChatError> {
    let title = match title.filter(|t| !t.trim().is_empty()) {
        Some(t) => t,
        None => format!("New Chat - {}", Utc::now().format("%b %d, %Y")),
    };

    let session = sqlx::query_as::<_, ChatSession>(
        "INSERT INTO chat_sessions (user_id, title) VALUES ($1, $2)
         RETURNING id, user_id, title, created_at",
    )
    .bind(user_id)
    .bind(&title)
    .fetch_one(pool)
    .await?;
    Ok(session)
}

/// List the user's sessions, newest first.
///
/// # Errors
///
/// Storage errors only.
pub async fn list_sessions(pool: &PgPool, user_id: Uuid) -> Result<Vec<ChatSession>, ChatError> {
    let sessions = sqlx::query_as::<_, ChatSession>(
        "SELECT id, user_id, title, created_at FROM chat_sessions
         WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(sessions)
}

async fn owned_session(pool: &PgPool, session_id: Uuid, user_id: Uuid) -> Result<ChatSession, ChatError> {
    let session = sqlx::query_as::<_, ChatSession>(
        "SELECT id, user_id, title, created_at FROM chat_sessions WHERE id = $1",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ChatError::SessionNotFound)?;

    if session.user_id != user_id {
        return Err(ChatError::NotOwner);
    }
    Ok(session)
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Persist the user's message, generate the AI reply through the dispatch
/// queue, persist it, and return both.
///
/// # Errors
///
/// Ownership errors, dispatch failures (busy/timeout/shutdown), or storage
/// errors.
pub async fn send_message(
    pool: &PgPool,
    queue: &RequestQueue<ChatJob, GeneratedReply>,
    session_id: Uuid,
    user_id: Uuid,
    zodiac_sign: &str,
    content: &str,
) -> Result<MessagePair, ChatError> {
    owned_session(pool, session_id, user_id).await?;

    let user_message = insert_message(pool, session_id, user_id, SENDER_USER, content).await?;

    let job = ChatJob { zodiac_sign: zodiac_sign.to_string(), user_message: content.to_string() };
    let reply = crate::ai::dispatch_chat(queue, job).await?;

    let ai_message = insert_message(pool, session_id, user_id, SENDER_AI, &reply.text).await?;

    Ok(MessagePair { user_message, ai_message, fallback: reply.fallback })
}

async fn insert_message(
    pool: &PgPool,
    session_id: Uuid,
    user_id: Uuid,
    sender: &str,
    content: &str,
) -> Result<Message, ChatError> {
    let message = sqlx::query_as::<_, Message>(
        "INSERT INTO messages (session_id, user_id, sender, content)
         VALUES ($1, $2, $3, $4)
         RETURNING id, session_id, user_id, sender, content, created_at",
    )
    .bind(session_id)
    .bind(user_id)
    .bind(sender)
    .bind(content)
    .fetch_one(pool)
    .await?;
    Ok(message)
}

/// Page through a session's messages, newest first.
///
/// # Errors
///
/// Ownership errors or storage errors.
pub async fn get_messages(
    pool: &PgPool,
    session_id: Uuid,
    user_id: Uuid,
    cursor: Option<&str>,
    limit: Option<i64>,
) -> Result<MessagePage, ChatError> {
    owned_session(pool, session_id, user_id).await?;

    let limit = clamp_limit(limit);
    let cursor_id = cursor.and_then(|c| c.parse::<i64>().ok());

    let mut messages = sqlx::query_as::<_, Message>(
        "SELECT id, session_id, user_id, sender, content, created_at FROM messages
         WHERE session_id = $1
           AND expires_at > now()
           AND ($2::bigint IS NULL OR id < $2)
         ORDER BY id DESC
         LIMIT $3",
    )
    .bind(session_id)
    .bind(cursor_id)
    .bind(limit + 1) // one extra row decides has_more
    .fetch_all(pool)
    .await?;

    let next_cursor = if messages.len() as i64 > limit {
        messages.truncate(limit as usize);
        messages.last().map(|m| m.id.to_string())
    } else {
        None
    };

    Ok(MessagePage { messages, next_cursor, limit })
}

pub(crate) fn clamp_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(l) if (1..=MAX_PAGE_LIMIT).contains(&l) => l,
        _ => DEFAULT_PAGE_LIMIT,
    }
}

// =============================================================================
// INSIGHT
// =============================================================================

/// Summarize the full transcript into a life-lesson insight. Falls back to a
/// deterministic insight when the provider is unavailable.
///
/// # Errors
///
/// Ownership errors, `EmptySession`, or storage errors.
pub async fn generate_insight(
    pool: &PgPool,
    ai: &AiClient,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<GeneratedReply, ChatError> {
    owned_session(pool, session_id, user_id).await?;

    let messages = sqlx::query_as::<_, Message>(
        "SELECT id, session_id, user_id, sender, content, created_at FROM messages
         WHERE session_id = $1 AND expires_at > now()
         ORDER BY id ASC",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    if messages.is_empty() {
        return Err(ChatError::EmptySession);
    }

    Ok(ai.generate_insight(&build_transcript(&messages)).await)
}

pub(crate) fn build_transcript(messages: &[Message]) -> String {
    let mut transcript = String::new();
    for message in messages {
        let sender = if message.sender == SENDER_AI { "AI" } else { "User" };
        transcript.push_str(sender);
        transcript.push_str(": ");
        transcript.push_str(&message.content);
        transcript.push('\n');
    }
    transcript
}
