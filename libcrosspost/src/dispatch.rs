//! Multi-platform dispatch
//!
//! Publishes one scheduled post to each of its target platforms concurrently
//! and folds the per-platform results into a single outcome. Nothing here
//! retries or writes post state; that is the scheduler's job.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::credentials::CredentialResolver;
use crate::error::PlatformError;
use crate::platforms::AdapterRegistry;
use crate::rate_limiter::RateLimiter;
use crate::types::{PlatformKind, ScheduledPost};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of publishing to a single platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformResult {
    pub platform: PlatformKind,
    /// Platform post id, or why the platform failed
    pub outcome: Result<String, PlatformError>,
}

impl PlatformResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Per-platform results of one dispatch, in the post's platform order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub results: Vec<PlatformResult>,
}

/// What one dispatch means for the post as a whole
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateOutcome {
    Success,
    /// At least one platform succeeded; `errors` lists only the failures
    PartialSuccess { errors: String },
    /// No platform succeeded; `retryable` is false when every failure was
    /// a permanent rejection of the content
    TotalFailure { errors: String, retryable: bool },
}

impl DispatchOutcome {
    pub fn new(results: Vec<PlatformResult>) -> Self {
        Self { results }
    }

    pub fn failures(&self) -> impl Iterator<Item = (PlatformKind, &PlatformError)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.platform, e)))
    }

    /// `"<platform>: <error>"` for every failure, joined by `"; "`
    pub fn error_summary(&self) -> String {
        self.failures()
            .map(|(platform, error)| format!("{}: {}", platform, error))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn aggregate(&self) -> AggregateOutcome {
        if self.results.is_empty() {
            return AggregateOutcome::TotalFailure {
                errors: "no target platforms".to_string(),
                retryable: false,
            };
        }

        let succeeded = self.results.iter().filter(|r| r.is_success()).count();
        if succeeded == self.results.len() {
            AggregateOutcome::Success
        } else if succeeded > 0 {
            AggregateOutcome::PartialSuccess {
                errors: self.error_summary(),
            }
        } else {
            AggregateOutcome::TotalFailure {
                errors: self.error_summary(),
                retryable: self.failures().any(|(_, e)| e.is_retryable()),
            }
        }
    }
}

/// Publishes posts through the registered adapters
#[derive(Clone)]
pub struct Dispatcher {
    registry: AdapterRegistry,
    resolver: Arc<dyn CredentialResolver>,
    rate_limiter: Option<RateLimiter>,
    call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: AdapterRegistry, resolver: Arc<dyn CredentialResolver>) -> Self {
        Self {
            registry,
            resolver,
            rate_limiter: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Hard upper bound on a single adapter call
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Publish `post` to all of its platforms concurrently
    pub async fn dispatch(&self, post: &ScheduledPost, now: i64) -> DispatchOutcome {
        let futures = post
            .platforms
            .iter()
            .map(|&platform| async move {
                let outcome = self.publish_to(post, platform, now).await;
                match &outcome {
                    Ok(platform_post_id) => info!(
                        post_id = %post.id,
                        %platform,
                        platform_post_id = %platform_post_id,
                        "Published to platform"
                    ),
                    Err(error) => warn!(
                        post_id = %post.id,
                        %platform,
                        %error,
                        "Failed to publish to platform"
                    ),
                }
                PlatformResult { platform, outcome }
            });

        // join_all keeps the input order
        DispatchOutcome::new(join_all(futures).await)
    }

    async fn publish_to(
        &self,
        post: &ScheduledPost,
        platform: PlatformKind,
        now: i64,
    ) -> Result<String, PlatformError> {
        let credential = self.resolver.resolve(&post.user_id, platform).await?;

        let adapter = self.registry.get(platform).ok_or_else(|| {
            PlatformError::Posting(format!("no adapter registered for {}", platform))
        })?;

        let limiter = match &self.rate_limiter {
            Some(limiter) => match limiter.check_and_record(platform, now).await {
                Ok(true) => Some(limiter),
                Ok(false) => {
                    return Err(PlatformError::RateLimit(
                        "local hourly limit reached".to_string(),
                    ))
                }
                // The limiter is advisory; an unreadable counter must not block posting
                Err(e) => {
                    warn!(%platform, error = %e, "Rate limit check failed");
                    None
                }
            },
            None => None,
        };

        debug!(post_id = %post.id, %platform, "Calling platform adapter");
        let result = match tokio::time::timeout(
            self.call_timeout,
            adapter.publish(&post.content, &post.media_urls, &credential),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Timeout(self.call_timeout.as_secs())),
        };

        // Only published posts count against the hourly limit
        if let (Err(_), Some(limiter)) = (&result, limiter) {
            if let Err(e) = limiter.release(platform, now).await {
                warn!(%platform, error = %e, "Failed to release rate limit slot");
            }
        }
        result
    }
}
