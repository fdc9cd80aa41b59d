//! Credential lookup for connected platform accounts
//!
//! Accounts are connected out of band (the OAuth flow writes to
//! `connected_accounts`). At dispatch time the scheduler only needs the
//! most recently connected account for a user and platform.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::Row;
use std::collections::HashMap;
use tracing::warn;

use crate::error::{DbError, PlatformError, Result};
use crate::types::PlatformKind;
use crate::Database;

/// Access token and account identity used for one publish call
pub struct Credential {
    /// Platform-side account (page id, channel id, chat id, ...)
    pub account_id: String,
    pub access_token: SecretString,
    pub connected_at: i64,
}

impl Credential {
    pub fn new(account_id: impl Into<String>, access_token: impl Into<String>, connected_at: i64) -> Self {
        Self {
            account_id: account_id.into(),
            access_token: SecretString::from(access_token.into()),
            connected_at,
        }
    }

    pub fn token(&self) -> &str {
        self.access_token.expose_secret()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("account_id", &self.account_id)
            .field("access_token", &"[REDACTED]")
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Credential for `user_id` on `platform`
    ///
    /// Any failure, including an unreadable store, is reported as
    /// [`PlatformError::NotConnected`] so it stays a per-platform outcome.
    async fn resolve(
        &self,
        user_id: &str,
        platform: PlatformKind,
    ) -> std::result::Result<Credential, PlatformError>;
}

/// Resolves credentials from the `connected_accounts` table
pub struct SqliteCredentialResolver {
    db: Database,
}

impl SqliteCredentialResolver {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Most recently connected account, `None` if there is none
    pub async fn lookup(&self, user_id: &str, platform: PlatformKind) -> Result<Option<Credential>> {
        let row = sqlx::query(
            r#"
            SELECT account_id, access_token, connected_at
            FROM connected_accounts
            WHERE user_id = ? AND platform = ?
            ORDER BY connected_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let access_token: String = row.try_get("access_token").map_err(DbError::SqlxError)?;
        if access_token.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(Credential::new(
            row.try_get::<String, _>("account_id")
                .map_err(DbError::SqlxError)?,
            access_token,
            row.try_get("connected_at").map_err(DbError::SqlxError)?,
        )))
    }
}

#[async_trait]
impl CredentialResolver for SqliteCredentialResolver {
    async fn resolve(
        &self,
        user_id: &str,
        platform: PlatformKind,
    ) -> std::result::Result<Credential, PlatformError> {
        match self.lookup(user_id, platform).await {
            Ok(Some(credential)) => Ok(credential),
            Ok(None) => Err(PlatformError::NotConnected),
            Err(e) => {
                warn!(%platform, user_id, error = %e, "Failed to load credentials");
                Err(PlatformError::NotConnected)
            }
        }
    }
}

/// In-memory resolver for tests and single-account deployments
#[derive(Default)]
pub struct StaticCredentialResolver {
    accounts: HashMap<(String, PlatformKind), (String, String)>,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(
        mut self,
        user_id: &str,
        platform: PlatformKind,
        account_id: &str,
        access_token: &str,
    ) -> Self {
        self.accounts.insert(
            (user_id.to_string(), platform),
            (account_id.to_string(), access_token.to_string()),
        );
        self
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(
        &self,
        user_id: &str,
        platform: PlatformKind,
    ) -> std::result::Result<Credential, PlatformError> {
        self.accounts
            .get(&(user_id.to_string(), platform))
            .map(|(account_id, token)| Credential::new(account_id.as_str(), token.as_str(), 0))
            .ok_or(PlatformError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_db() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(&db_path.to_string_lossy()).await.unwrap();
        (temp_dir, db)
    }

    #[tokio::test]
    async fn test_resolves_most_recent_account() {
        let (_temp, db) = setup_test_db().await;
        db.connect_account("user-1", PlatformKind::Facebook, "page-old", "token-old", 100)
            .await
            .unwrap();
        db.connect_account("user-1", PlatformKind::Facebook, "page-new", "token-new", 200)
            .await
            .unwrap();

        let resolver = SqliteCredentialResolver::new(db);
        let credential = resolver
            .resolve("user-1", PlatformKind::Facebook)
            .await
            .unwrap();

        assert_eq!(credential.account_id, "page-new");
        assert_eq!(credential.token(), "token-new");
        assert_eq!(credential.connected_at, 200);
    }

    #[tokio::test]
    async fn test_missing_account_is_not_connected() {
        let (_temp, db) = setup_test_db().await;
        db.connect_account("user-1", PlatformKind::Twitter, "acct", "token", 100)
            .await
            .unwrap();

        let resolver = SqliteCredentialResolver::new(db);
        assert_eq!(
            resolver
                .resolve("user-1", PlatformKind::Mastodon)
                .await
                .unwrap_err(),
            PlatformError::NotConnected
        );
        assert!(resolver
            .lookup("user-2", PlatformKind::Twitter)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_empty_token_is_not_connected() {
        let (_temp, db) = setup_test_db().await;
        db.connect_account("user-1", PlatformKind::Telegram, "chat", "  ", 100)
            .await
            .unwrap();

        let resolver = SqliteCredentialResolver::new(db);
        assert!(resolver
            .resolve("user-1", PlatformKind::Telegram)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticCredentialResolver::new().with_account(
            "user-1",
            PlatformKind::Youtube,
            "channel",
            "secret",
        );

        let credential = resolver
            .resolve("user-1", PlatformKind::Youtube)
            .await
            .unwrap();
        assert_eq!(credential.account_id, "channel");
        assert_eq!(credential.token(), "secret");
        assert!(matches!(
            resolver.resolve("user-1", PlatformKind::Twitter).await,
            Err(PlatformError::NotConnected)
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let credential = Credential::new("acct", "super-secret-token", 1);
        let debug = format!("{:?}", credential);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret-token"));
    }
}
