//! Mock platform adapter for testing
//!
//! A configurable adapter that can simulate successes, failures and slow
//! networks. Outcomes can be scripted per call; once the script runs out the
//! default outcome is returned. Call counters are shared handles so tests can
//! keep observing an adapter after handing it to a registry.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;

use crate::credentials::Credential;
use crate::error::PlatformError;
use crate::platforms::PlatformAdapter;
use crate::types::PlatformKind;

type Outcome = Result<String, PlatformError>;

/// Content and account of one publish call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedCall {
    pub content: String,
    pub media_urls: Vec<String>,
    pub account_id: String,
}

pub struct MockAdapter {
    kind: PlatformKind,
    script: Mutex<VecDeque<Outcome>>,
    default_outcome: Outcome,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    published: Arc<Mutex<Vec<PublishedCall>>>,
}

impl MockAdapter {
    pub fn new(kind: PlatformKind, default_outcome: Outcome) -> Self {
        Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            default_outcome,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Adapter that always succeeds with ids like `twitter-1`, `twitter-2`
    pub fn success(kind: PlatformKind) -> Self {
        Self::new(kind, Ok(String::new()))
    }

    /// Adapter that always fails with `error`
    pub fn failing(kind: PlatformKind, error: PlatformError) -> Self {
        Self::new(kind, Err(error))
    }

    /// Outcomes returned, in order, before falling back to the default
    pub fn with_script(self, outcomes: Vec<Outcome>) -> Self {
        *lock(&self.script) = outcomes.into();
        self
    }

    /// Simulate network latency on every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Shared handle to the call counter
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Shared handle to the record of successful publishes
    pub fn published(&self) -> Arc<Mutex<Vec<PublishedCall>>> {
        Arc::clone(&self.published)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    async fn publish(
        &self,
        content: &str,
        media_urls: &[String],
        credential: &Credential,
    ) -> Result<String, PlatformError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let scripted = lock(&self.script).pop_front();
        let outcome = scripted.unwrap_or_else(|| self.default_outcome.clone());

        match outcome {
            Ok(id) => {
                lock(&self.published).push(PublishedCall {
                    content: content.to_string(),
                    media_urls: media_urls.to_vec(),
                    account_id: credential.account_id.clone(),
                });
                if id.is_empty() {
                    Ok(format!("{}-{}", self.kind, call))
                } else {
                    Ok(id)
                }
            }
            Err(e) => Err(e),
        }
    }

    fn kind(&self) -> PlatformKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential::new("acct", "token", 0)
    }

    #[tokio::test]
    async fn test_success_generates_ids() {
        let mock = MockAdapter::success(PlatformKind::Twitter);

        assert_eq!(mock.publish("a", &[], &credential()).await.unwrap(), "twitter-1");
        assert_eq!(mock.publish("b", &[], &credential()).await.unwrap(), "twitter-2");
        assert_eq!(mock.call_count(), 2);

        let published = mock.published();
        let published = published.lock().unwrap();
        assert_eq!(published[1].content, "b");
        assert_eq!(published[1].account_id, "acct");
    }

    #[tokio::test]
    async fn test_failing() {
        let mock = MockAdapter::failing(
            PlatformKind::Facebook,
            PlatformError::Server("HTTP 500".to_string()),
        );

        let err = mock.publish("a", &[], &credential()).await.unwrap_err();
        assert_eq!(err, PlatformError::Server("HTTP 500".to_string()));
        assert!(mock.published().lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let mock = MockAdapter::success(PlatformKind::Mastodon).with_script(vec![
            Err(PlatformError::Network("refused".to_string())),
            Ok("status-9".to_string()),
        ]);

        assert!(mock.publish("a", &[], &credential()).await.is_err());
        assert_eq!(mock.publish("a", &[], &credential()).await.unwrap(), "status-9");
        assert_eq!(mock.publish("a", &[], &credential()).await.unwrap(), "mastodon-3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay() {
        let mock = MockAdapter::success(PlatformKind::Telegram).with_delay(Duration::from_secs(5));
        let start = tokio::time::Instant::now();

        mock.publish("a", &[], &credential()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
