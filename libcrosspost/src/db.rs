//! Database operations for Crosspost
//!
//! The scheduler only needs the [`PostStore`] seam: the due-post query and the
//! conditional state transition. The remaining methods on [`Database`] are the
//! operations the API layer uses to create, edit and cancel posts, and they
//! enforce the same invariants the scheduler relies on.

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;
use tracing::warn;

use crate::error::{CrosspostError, DbError, Result};
use crate::retry::Transition;
use crate::types::{
    validate_post_fields, validate_schedule, NewScheduledPost, PlatformKind, PostEdit, PostStatus,
    ScheduledPost,
};

const POST_COLUMNS: &str = "id, user_id, content, media_urls, platforms, scheduled_time, status, \
     retry_count, error_message, next_attempt_at, created_at, updated_at";

/// Persistence consumed by the scheduler loop
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Pending posts whose scheduled time (and retry backoff) has passed,
    /// earliest scheduled first
    async fn due_posts(&self, now: i64) -> Result<Vec<ScheduledPost>>;

    /// Apply `transition` to `post` if it is still pending with the retry
    /// count observed before dispatch
    ///
    /// Returns `false` when the row changed underneath (cancelled or
    /// already transitioned), in which case nothing is written.
    async fn apply_transition(
        &self,
        post: &ScheduledPost,
        transition: &Transition,
        now: i64,
    ) -> Result<bool>;
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // mode=rwc creates the file on first use
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert a new pending post
    pub async fn create_post(&self, new_post: NewScheduledPost, now: i64) -> Result<ScheduledPost> {
        if new_post.user_id.trim().is_empty() {
            return Err(CrosspostError::InvalidInput("User id cannot be empty".to_string()));
        }
        validate_post_fields(&new_post.content, &new_post.media_urls, &new_post.platforms)?;
        validate_schedule(new_post.scheduled_time, now)?;

        let post = new_post.into_post(now);

        sqlx::query(
            r#"
            INSERT INTO scheduled_posts
                (id, user_id, content, media_urls, platforms, scheduled_time, status,
                 retry_count, error_message, next_attempt_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, NULL, NULL, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.content)
        .bind(encode_json(&post.media_urls)?)
        .bind(encode_json(&post.platforms)?)
        .bind(post.scheduled_time)
        .bind(post.status.as_str())
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(post)
    }

    /// Get a post by ID
    pub async fn get_post(&self, post_id: &str) -> Result<Option<ScheduledPost>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM scheduled_posts WHERE id = ?",
            POST_COLUMNS
        ))
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(|r| post_from_row(&r)).transpose()
    }

    /// All posts of a user, latest scheduled first
    pub async fn list_posts(&self, user_id: &str) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM scheduled_posts WHERE user_id = ? ORDER BY scheduled_time DESC, created_at DESC",
            POST_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Edit a post that is still pending
    pub async fn update_post(&self, post_id: &str, edit: PostEdit, now: i64) -> Result<ScheduledPost> {
        let current = self
            .get_post(post_id)
            .await?
            .ok_or_else(|| CrosspostError::NotFound(post_id.to_string()))?;

        if current.status != PostStatus::Pending {
            return Err(CrosspostError::InvalidState(format!(
                "Post {} is {} and can no longer be edited",
                post_id, current.status
            )));
        }

        if edit.is_empty() {
            return Ok(current);
        }

        if let Some(scheduled_time) = edit.scheduled_time {
            validate_schedule(scheduled_time, now)?;
        }

        let content = edit.content.unwrap_or(current.content);
        let media_urls = edit.media_urls.unwrap_or(current.media_urls);
        let platforms = edit.platforms.unwrap_or(current.platforms);
        let scheduled_time = edit.scheduled_time.unwrap_or(current.scheduled_time);
        validate_post_fields(&content, &media_urls, &platforms)?;

        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET content = ?, media_urls = ?, platforms = ?, scheduled_time = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(&content)
        .bind(encode_json(&media_urls)?)
        .bind(encode_json(&platforms)?)
        .bind(scheduled_time)
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            // The scheduler transitioned the post between our read and write
            return Err(CrosspostError::InvalidState(format!(
                "Post {} is no longer pending",
                post_id
            )));
        }

        self.get_post(post_id)
            .await?
            .ok_or_else(|| CrosspostError::NotFound(post_id.to_string()))
    }

    /// Cancel a pending or failed post; the row is kept for history
    pub async fn cancel_post(&self, post_id: &str, now: i64) -> Result<()> {
        let post = self
            .get_post(post_id)
            .await?
            .ok_or_else(|| CrosspostError::NotFound(post_id.to_string()))?;

        if !post.status.is_cancellable() {
            return Err(CrosspostError::InvalidState(format!(
                "Post {} is {} and cannot be cancelled",
                post_id, post.status
            )));
        }

        // Guarded on the observed status so a concurrent publish wins
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET status = 'cancelled', next_attempt_at = NULL, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(now)
        .bind(post_id)
        .bind(post.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(CrosspostError::InvalidState(format!(
                "Post {} changed while being cancelled",
                post_id
            )));
        }
        Ok(())
    }

    /// Record an account connected through the OAuth flow
    pub async fn connect_account(
        &self,
        user_id: &str,
        platform: PlatformKind,
        account_id: &str,
        access_token: &str,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO connected_accounts (user_id, platform, account_id, access_token, connected_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .bind(account_id)
        .bind(access_token)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }
}

#[async_trait]
impl PostStore for Database {
    async fn due_posts(&self, now: i64) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM scheduled_posts
            WHERE status = 'pending'
              AND scheduled_time <= ?
              AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
            ORDER BY scheduled_time ASC, created_at ASC
            "#,
            POST_COLUMNS
        ))
        .bind(now)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        // A single unreadable row must not block every other due post
        let mut posts = Vec::with_capacity(rows.len());
        for row in &rows {
            match post_from_row(row) {
                Ok(post) => posts.push(post),
                Err(e) => warn!(error = %e, "Skipping unreadable scheduled post"),
            }
        }
        Ok(posts)
    }

    async fn apply_transition(
        &self,
        post: &ScheduledPost,
        transition: &Transition,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET status = ?, retry_count = ?, error_message = ?, next_attempt_at = ?, updated_at = ?
            WHERE id = ? AND status = 'pending' AND retry_count = ?
            "#,
        )
        .bind(transition.status().as_str())
        .bind(i64::from(transition.retry_count(post.retry_count)))
        .bind(transition.error_message())
        .bind(transition.next_attempt_at())
        .bind(now)
        .bind(&post.id)
        .bind(i64::from(post.retry_count))
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| CrosspostError::InvalidInput(format!("Failed to encode value: {}", e)))
}

fn post_from_row(row: &SqliteRow) -> Result<ScheduledPost> {
    let id: String = row.try_get("id").map_err(DbError::SqlxError)?;
    let corrupt = |reason: String| DbError::CorruptRow {
        id: id.clone(),
        reason,
    };

    let media_urls: String = row.try_get("media_urls").map_err(DbError::SqlxError)?;
    let platforms: String = row.try_get("platforms").map_err(DbError::SqlxError)?;
    let status: String = row.try_get("status").map_err(DbError::SqlxError)?;
    let retry_count: i64 = row.try_get("retry_count").map_err(DbError::SqlxError)?;

    Ok(ScheduledPost {
        user_id: row.try_get("user_id").map_err(DbError::SqlxError)?,
        content: row.try_get("content").map_err(DbError::SqlxError)?,
        media_urls: serde_json::from_str(&media_urls)
            .map_err(|e| corrupt(format!("media_urls: {}", e)))?,
        platforms: serde_json::from_str(&platforms)
            .map_err(|e| corrupt(format!("platforms: {}", e)))?,
        scheduled_time: row.try_get("scheduled_time").map_err(DbError::SqlxError)?,
        status: status
            .parse()
            .map_err(|_| corrupt(format!("status '{}'", status)))?,
        retry_count: u32::try_from(retry_count)
            .map_err(|_| corrupt(format!("retry_count {}", retry_count)))?,
        error_message: row.try_get("error_message").map_err(DbError::SqlxError)?,
        next_attempt_at: row.try_get("next_attempt_at").map_err(DbError::SqlxError)?,
        created_at: row.try_get("created_at").map_err(DbError::SqlxError)?,
        updated_at: row.try_get("updated_at").map_err(DbError::SqlxError)?,
        id,
    })
}
