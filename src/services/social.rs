//! Social feed service — posts, likes, comments.
//!
//! DESIGN
//! ======
//! Posts are anonymous on the wire: the author's zodiac is denormalized onto
//! the row and serialized, the author id is not. Denormalized counters
//! (`likes_count`, `comments_count`, `total_posts`) move atomically inside
//! the same transaction as the mutation that justifies them, so they converge
//! under concurrent traffic. The unique `(post_id, user_id)` like row is what
//! makes double-likes a conflict instead of a lost update.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

const DEFAULT_PAGE_LIMIT: i64 = 20;
const MAX_PAGE_LIMIT: i64 = 50;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SocialError {
    #[error("post not found")]
    PostNotFound,
    #[error("post already liked")]
    AlreadyLiked,
    #[error("post not liked")]
    NotLiked,
    #[error("parent comment not found")]
    ParentNotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A feed post. The author id stays server-side for anonymity.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub author_zodiac: String,
    pub title: String,
    pub content: String,
    pub mood_tags: Vec<String>,
    pub status: String,
    pub likes_count: i32,
    pub comments_count: i32,
    pub created_at: DateTime<Utc>,
}

const POST_COLUMNS: &str = "id, author_zodiac, title, content, mood_tags, status, likes_count, comments_count, created_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: Uuid,
    pub username: String,
    pub content: String,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Feed query parameters.
#[derive(Debug, Default)]
pub struct FeedQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
    pub zodiac: Option<String>,
    pub mood: Option<String>,
    /// `latest` (default) or `most_liked`.
    pub sort: Option<String>,
}

#[derive(Debug)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub next_cursor: Option<String>,
    pub limit: i64,
}

// =============================================================================
// POSTS
// =============================================================================

/// Publish a post and bump the author's `total_posts`.
///
/// # Errors
///
/// Storage errors only.
pub async fn publish_post(
    pool: &PgPool,
    user_id: Uuid,
    author_zodiac: &str,
    title: &str,
    content: &str,
    mood_tags: Vec<String>,
) -> Result<Post, SocialError> {
    let mut tx = pool.begin().await?;

    let query = format!(
        "INSERT INTO posts (user_id, author_zodiac, title, content, mood_tags)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {POST_COLUMNS}"
    );
    let post = sqlx::query_as::<_, Post>(&query)
        .bind(user_id)
        .bind(author_zodiac)
        .bind(title)
        .bind(content)
        .bind(&mood_tags)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query("UPDATE users SET total_posts = total_posts + 1 WHERE id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(post)
}

/// Public feed with cursor pagination and optional zodiac/mood filters.
///
/// # Errors
///
/// Storage errors only.
pub async fn get_feed(pool: &PgPool, query: FeedQuery) -> Result<FeedPage, SocialError> {
    let limit = clamp_limit(query.limit);
    let cursor_id = query.cursor.as_deref().and_then(|c| c.parse::<i64>().ok());
    let most_liked = query.sort.as_deref() == Some("most_liked");

    let order = if most_liked { "likes_count DESC, id DESC" } else { "id DESC" };
    let sql = format!(
        "SELECT {POST_COLUMNS} FROM posts
         WHERE status = 'PUBLISHED'
           AND ($1::text IS NULL OR author_zodiac = $1)
           AND ($2::text IS NULL OR mood_tags @> ARRAY[$2]::text[])
           AND ($3::bigint IS NULL OR id < $3)
         ORDER BY {order}
         LIMIT $4"
    );

    let mut posts = sqlx::query_as::<_, Post>(&sql)
        .bind(query.zodiac)
        .bind(query.mood)
        .bind(cursor_id)
        .bind(limit + 1)
        .fetch_all(pool)
        .await?;

    let next_cursor = if posts.len() as i64 > limit {
        posts.truncate(limit as usize);
        posts.last().map(|p| p.id.to_string())
    } else {
        None
    };

    Ok(FeedPage { posts, next_cursor, limit })
}

/// Fetch one published post.
///
/// # Errors
///
/// `PostNotFound` when the id does not resolve.
pub async fn get_post(pool: &PgPool, post_id: i64) -> Result<Post, SocialError> {
    let query = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1 AND status = 'PUBLISHED'");
    sqlx::query_as::<_, Post>(&query)
        .bind(post_id)
        .fetch_optional(pool)
        .await?
        .ok_or(SocialError::PostNotFound)
}

// =============================================================================
// LIKES
// =============================================================================

/// Like a post: insert the like row and increment the counter atomically.
///
/// # Errors
///
/// `PostNotFound`, `AlreadyLiked`, or storage errors.
pub async fn like_post(pool: &PgPool, post_id: i64, user_id: Uuid) -> Result<(), SocialError> {
    get_post(pool, post_id).await?;

    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2)
         ON CONFLICT (post_id, user_id) DO NOTHING",
    )
    .bind(post_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;
    if inserted.rows_affected() == 0 {
        return Err(SocialError::AlreadyLiked);
    }

    sqlx::query("UPDATE posts SET likes_count = likes_count + 1 WHERE id = $1")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Remove a like and decrement the counter atomically.
///
/// # Errors
///
/// `PostNotFound`, `NotLiked`, or storage errors.
pub async fn unlike_post(pool: &PgPool, post_id: i64, user_id: Uuid) -> Result<(), SocialError> {
    get_post(pool, post_id).await?;

    let mut tx = pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(SocialError::NotLiked);
    }

    sqlx::query("UPDATE posts SET likes_count = greatest(likes_count - 1, 0) WHERE id = $1")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

// =============================================================================
// COMMENTS
// =============================================================================

/// Add a comment (optionally nested) and bump the post's comment counter.
///
/// # Errors
///
/// `PostNotFound`, `ParentNotFound`, or storage errors.
pub async fn add_comment(
    pool: &PgPool,
    post_id: i64,
    user_id: Uuid,
    username: &str,
    content: &str,
    parent_id: Option<i64>,
) -> Result<Comment, SocialError> {
    get_post(pool, post_id).await?;

    if let Some(parent) = parent_id {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM comments WHERE id = $1 AND post_id = $2)")
                .bind(parent)
                .bind(post_id)
                .fetch_one(pool)
                .await?;
        if !exists {
            return Err(SocialError::ParentNotFound);
        }
    }

    let mut tx = pool.begin().await?;

    let comment = sqlx::query_as::<_, Comment>(
        "INSERT INTO comments (post_id, user_id, username, content, parent_id)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, post_id, user_id, username, content, parent_id, created_at",
    )
    .bind(post_id)
    .bind(user_id)
    .bind(username)
    .bind(content)
    .bind(parent_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE posts SET comments_count = comments_count + 1 WHERE id = $1")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(comment)
}

/// List a post's comments in chronological order.
///
/// # Errors
///
/// `PostNotFound` or storage errors.
pub async fn get_comments(pool: &PgPool, post_id: i64) -> Result<Vec<Comment>, SocialError> {
    get_post(pool, post_id).await?;

    let comments = sqlx::query_as::<_, Comment>(
        "SELECT id, post_id, user_id, username, content, parent_id, created_at
         FROM comments WHERE post_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;
    Ok(comments)
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(l) if (1..=MAX_PAGE_LIMIT).contains(&l) => l,
        _ => DEFAULT_PAGE_LIMIT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_json_has_no_author_id() {
        let post = Post {
            id: 7,
            author_zodiac: "Pisces".into(),
            title: "t".into(),
            content: "c".into(),
            mood_tags: vec!["calm".into()],
            status: "PUBLISHED".into(),
            likes_count: 0,
            comments_count: 0,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&post).unwrap();
        assert!(json.get("user_id").is_none());
        assert_eq!(json["author_zodiac"], "Pisces");
    }

    #[test]
    fn clamp_limit_bounds() {
        assert_eq!(clamp_limit(None), 20);
        assert_eq!(clamp_limit(Some(200)), 20);
        assert_eq!(clamp_limit(Some(35)), 35);
    }

    #[test]
    fn comment_json_round_trip() {
        let comment = Comment {
            id: 1,
            post_id: 7,
            user_id: Uuid::nil(),
            username: "alice".into(),
            content: "nice".into(),
            parent_id: Some(9),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&comment).unwrap();
        assert_eq!(json["parent_id"], 9);
        assert_eq!(json["username"], "alice");
    }
}
