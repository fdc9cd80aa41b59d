//! Local rate limiting for platform dispatch
//!
//! Prevents over-posting to platforms by tracking posts per hour window.
//! Counts live in the `rate_limits` table so they survive daemon restarts.

use std::collections::HashMap;

use crate::error::{DbError, Result};
use crate::types::PlatformKind;
use crate::Database;

/// Rate limiter for platform posting
#[derive(Clone)]
pub struct RateLimiter {
    db: Database,
    /// Platform-specific limits (posts per hour)
    limits: HashMap<PlatformKind, u32>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given limits
    pub fn new(db: Database, limits: HashMap<PlatformKind, u32>) -> Self {
        Self { db, limits }
    }

    pub fn limit_for(&self, platform: PlatformKind) -> Option<u32> {
        self.limits.get(&platform).copied()
    }

    /// Check if posting is allowed and record the post
    ///
    /// Returns Ok(true) if posting is allowed, Ok(false) if rate limited
    pub async fn check_and_record(&self, platform: PlatformKind, now: i64) -> Result<bool> {
        let limit = match self.limit_for(platform) {
            None => return Ok(true),
            Some(0) => return Ok(false),
            Some(limit) => limit,
        };

        // Single statement so concurrent dispatches cannot both take the last slot
        let result = sqlx::query(
            r#"
            INSERT INTO rate_limits (platform, window_start, post_count)
            VALUES (?, ?, 1)
            ON CONFLICT(platform, window_start)
            DO UPDATE SET post_count = post_count + 1
            WHERE post_count < ?
            "#,
        )
        .bind(platform.as_str())
        .bind(window_start(now))
        .bind(i64::from(limit))
        .execute(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Give back a slot taken by `check_and_record` for a call that did not publish
    pub async fn release(&self, platform: PlatformKind, now: i64) -> Result<()> {
        if self.limit_for(platform).is_none() {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE rate_limits SET post_count = post_count - 1
            WHERE platform = ? AND window_start = ? AND post_count > 0
            "#,
        )
        .bind(platform.as_str())
        .bind(window_start(now))
        .execute(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Posts recorded for `platform` in the hour window containing `now`
    pub async fn window_count(&self, platform: PlatformKind, now: i64) -> Result<u32> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT post_count FROM rate_limits
            WHERE platform = ? AND window_start = ?
            "#,
        )
        .bind(platform.as_str())
        .bind(window_start(now))
        .fetch_optional(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map_or(0, |(count,)| u32::try_from(count).unwrap_or(u32::MAX)))
    }

    /// Clean up old rate limit windows
    pub async fn cleanup_old_windows(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rate_limits WHERE window_start < ?")
            .bind(window_start(cutoff))
            .execute(self.db.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }
}

/// Get the window start timestamp (floor to hour)
fn window_start(timestamp: i64) -> i64 {
    timestamp.div_euclid(3600) * 3600
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NOW: i64 = 1_000_000;

    async fn setup_limiter(limits: &[(PlatformKind, u32)]) -> (TempDir, RateLimiter) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(&db_path.to_string_lossy()).await.unwrap();
        let limiter = RateLimiter::new(db, limits.iter().copied().collect());
        (temp_dir, limiter)
    }

    #[tokio::test]
    async fn test_blocks_posts_over_limit() {
        let (_temp, limiter) = setup_limiter(&[(PlatformKind::Twitter, 5)]).await;

        for i in 0..5 {
            let allowed = limiter.check_and_record(PlatformKind::Twitter, NOW).await.unwrap();
            assert!(allowed, "Post {} should be allowed (under limit)", i + 1);
        }

        let allowed = limiter.check_and_record(PlatformKind::Twitter, NOW).await.unwrap();
        assert!(!allowed, "Post 6 should be blocked (over limit)");
        assert_eq!(limiter.window_count(PlatformKind::Twitter, NOW).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_new_window_resets_count() {
        let (_temp, limiter) = setup_limiter(&[(PlatformKind::Mastodon, 2)]).await;

        for _ in 0..2 {
            limiter.check_and_record(PlatformKind::Mastodon, NOW).await.unwrap();
        }
        assert!(!limiter
            .check_and_record(PlatformKind::Mastodon, NOW + 100)
            .await
            .unwrap());

        assert!(limiter
            .check_and_record(PlatformKind::Mastodon, NOW + 3600)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_independent_platforms() {
        let (_temp, limiter) =
            setup_limiter(&[(PlatformKind::Twitter, 1), (PlatformKind::Telegram, 1)]).await;

        assert!(limiter.check_and_record(PlatformKind::Twitter, NOW).await.unwrap());
        assert!(!limiter.check_and_record(PlatformKind::Twitter, NOW).await.unwrap());
        assert!(limiter.check_and_record(PlatformKind::Telegram, NOW).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_returns_slot() {
        let (_temp, limiter) = setup_limiter(&[(PlatformKind::Facebook, 1)]).await;

        assert!(limiter.check_and_record(PlatformKind::Facebook, NOW).await.unwrap());
        assert!(!limiter.check_and_record(PlatformKind::Facebook, NOW).await.unwrap());

        limiter.release(PlatformKind::Facebook, NOW).await.unwrap();
        assert_eq!(limiter.window_count(PlatformKind::Facebook, NOW).await.unwrap(), 0);
        assert!(limiter.check_and_record(PlatformKind::Facebook, NOW).await.unwrap());

        // Never goes below zero
        limiter.release(PlatformKind::Facebook, NOW).await.unwrap();
        limiter.release(PlatformKind::Facebook, NOW).await.unwrap();
        assert_eq!(limiter.window_count(PlatformKind::Facebook, NOW).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_zero_limit_blocks_everything() {
        let (_temp, limiter) = setup_limiter(&[(PlatformKind::Youtube, 0)]).await;
        assert!(!limiter.check_and_record(PlatformKind::Youtube, NOW).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_limit_configured() {
        let (_temp, limiter) = setup_limiter(&[]).await;

        for _ in 0..50 {
            assert!(limiter.check_and_record(PlatformKind::Instagram, NOW).await.unwrap());
        }
        // Unlimited platforms are not tracked
        assert_eq!(limiter.window_count(PlatformKind::Instagram, NOW).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_old_windows() {
        let (_temp, limiter) = setup_limiter(&[(PlatformKind::Twitter, 1)]).await;

        limiter.check_and_record(PlatformKind::Twitter, NOW).await.unwrap();
        let later = NOW + 7200;
        limiter.check_and_record(PlatformKind::Twitter, later).await.unwrap();

        let removed = limiter.cleanup_old_windows(later - 3600).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(limiter.window_count(PlatformKind::Twitter, NOW).await.unwrap(), 0);
        assert_eq!(limiter.window_count(PlatformKind::Twitter, later).await.unwrap(), 1);
    }

    #[test]
    fn test_window_start_floors_to_hour() {
        assert_eq!(window_start(3599), 0);
        assert_eq!(window_start(3600), 3600);
        assert_eq!(window_start(7300), 7200);
    }
}
