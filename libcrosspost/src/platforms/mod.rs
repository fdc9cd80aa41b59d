//! Platform adapters
//!
//! Each adapter performs exactly one publish call against one external
//! network and reports the result as a platform post id or a classified
//! [`PlatformError`]. Adapters never retry and never touch the post store;
//! retry decisions belong to the scheduler.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::credentials::Credential;
use crate::error::{PlatformError, Result};
use crate::types::PlatformKind;

pub mod facebook;
pub mod http;
pub mod instagram;
pub mod mastodon;
pub mod telegram;
pub mod twitter;
pub mod youtube;

// Compiled outside cfg(test) so integration tests can script adapters
pub mod mock;

/// Unified publish interface for external social networks
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Publish `content` with optional media to the account behind `credential`
    ///
    /// Returns the platform-specific post id on success.
    async fn publish(
        &self,
        content: &str,
        media_urls: &[String],
        credential: &Credential,
    ) -> std::result::Result<String, PlatformError>;

    fn kind(&self) -> PlatformKind;
}

/// Adapters keyed by the platform they publish to
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<PlatformKind, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every HTTP adapter, pointed at the configured endpoints
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http::build_client(config.scheduler.call_timeout())?;
        let base = |kind| config.api_base(kind);

        Ok(Self::new()
            .with(facebook::FacebookAdapter::new(client.clone(), base(PlatformKind::Facebook)))
            .with(instagram::InstagramAdapter::new(client.clone(), base(PlatformKind::Instagram)))
            .with(youtube::YoutubeAdapter::new(client.clone(), base(PlatformKind::Youtube)))
            .with(twitter::TwitterAdapter::new(client.clone(), base(PlatformKind::Twitter)))
            .with(mastodon::MastodonAdapter::new(base(PlatformKind::Mastodon)))
            .with(telegram::TelegramAdapter::new(client, base(PlatformKind::Telegram))))
    }

    /// Register an adapter, replacing any previous one for the same platform
    pub fn with<A: PlatformAdapter + 'static>(mut self, adapter: A) -> Self {
        self.register(Arc::new(adapter));
        self
    }

    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: PlatformKind) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Reject content longer than `limit` characters
pub(crate) fn check_length(
    kind: PlatformKind,
    text: &str,
    limit: usize,
) -> std::result::Result<(), PlatformError> {
    let count = text.chars().count();
    if count > limit {
        return Err(PlatformError::Validation(format!(
            "Content exceeds {}'s {} character limit (current: {} characters)",
            kind, limit, count
        )));
    }
    Ok(())
}

/// Text with media urls appended, for networks that cannot attach remote media
pub(crate) fn text_with_links(content: &str, media_urls: &[String]) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(media_urls.len() + 1);
    if !content.trim().is_empty() {
        parts.push(content.trim_end());
    }
    parts.extend(media_urls.iter().map(String::as_str));
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockAdapter;

    #[test]
    fn test_registry_from_default_config_has_every_platform() {
        let registry = AdapterRegistry::from_config(&Config::default_config()).unwrap();

        assert_eq!(registry.len(), PlatformKind::ALL.len());
        for kind in PlatformKind::ALL {
            assert_eq!(registry.get(kind).unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_register_replaces_existing_adapter() {
        let mock = MockAdapter::success(PlatformKind::Twitter);
        let calls = mock.call_counter();
        let registry = AdapterRegistry::from_config(&Config::default_config())
            .unwrap()
            .with(mock);

        assert_eq!(registry.len(), PlatformKind::ALL.len());
        assert_eq!(registry.get(PlatformKind::Twitter).unwrap().kind(), PlatformKind::Twitter);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_registry() {
        let registry = AdapterRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get(PlatformKind::Facebook).is_none());
    }

    #[test]
    fn test_check_length_counts_chars() {
        assert!(check_length(PlatformKind::Twitter, &"é".repeat(280), 280).is_ok());
        let err = check_length(PlatformKind::Twitter, &"a".repeat(281), 280).unwrap_err();
        assert!(matches!(err, PlatformError::Validation(_)));
        assert!(err.to_string().contains("twitter's 280 character limit"));
    }

    #[test]
    fn test_text_with_links() {
        let media = vec!["https://a.example/1.png".to_string()];
        assert_eq!(text_with_links("Hello ", &media), "Hello\nhttps://a.example/1.png");
        assert_eq!(text_with_links("", &media), "https://a.example/1.png");
        assert_eq!(text_with_links("Hi", &[]), "Hi");
    }
}
