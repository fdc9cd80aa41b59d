//! Scheduled post processing
//!
//! One tick finds every due post, dispatches each of them once and records
//! the resulting state. Posts are processed with bounded concurrency, each in
//! its own task, so one failing or panicking post cannot affect the others.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::db::PostStore;
use crate::dispatch::Dispatcher;
use crate::retry::{RetryPolicy, Transition};
use crate::types::ScheduledPost;

/// Counts for one scheduler tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Posts returned by the due query
    pub due: usize,
    pub posted: usize,
    /// Posts left pending for another attempt
    pub retried: usize,
    pub failed: usize,
    /// Posts whose row changed while they were being dispatched
    pub skipped: usize,
    /// Store failures and crashed post tasks
    pub errors: usize,
}

impl TickReport {
    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Posted => self.posted += 1,
            Disposition::Retried => self.retried += 1,
            Disposition::Failed => self.failed += 1,
            Disposition::Skipped => self.skipped += 1,
            Disposition::Error => self.errors += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Posted,
    Retried,
    Failed,
    Skipped,
    Error,
}

#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn PostStore>,
    dispatcher: Arc<Dispatcher>,
    policy: RetryPolicy,
    max_concurrent_posts: usize,
}

impl Scheduler {
    pub fn new(store: Arc<dyn PostStore>, dispatcher: Arc<Dispatcher>, config: &SchedulerConfig) -> Self {
        Self {
            store,
            dispatcher,
            policy: RetryPolicy::from_config(config),
            max_concurrent_posts: config.max_concurrent_posts.max(1),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Process every post due at `now`
    pub async fn tick(&self, now: i64) -> TickReport {
        let mut report = TickReport::default();

        let posts = match self.store.due_posts(now).await {
            Ok(posts) => posts,
            Err(e) => {
                error!(error = %e, "Failed to query due posts");
                report.errors += 1;
                return report;
            }
        };

        report.due = posts.len();
        if posts.is_empty() {
            debug!("No posts due");
            return report;
        }
        info!(count = posts.len(), "Processing due posts");

        // buffered() pulls (and so spawns) at most max_concurrent_posts at a time,
        // in due order
        let handles = stream::iter(posts)
            .map(|post| {
                let scheduler = self.clone();
                let post_id = post.id.clone();
                let handle = tokio::spawn(async move { scheduler.process_post(post, now).await });
                async move { (post_id, handle.await) }
            })
            .buffered(self.max_concurrent_posts);

        let results: Vec<_> = handles.collect().await;
        for (post_id, joined) in results {
            match joined {
                Ok(disposition) => report.record(disposition),
                Err(e) => {
                    error!(post_id = %post_id, error = %e, "Post task crashed");
                    report.errors += 1;
                }
            }
        }

        info!(
            due = report.due,
            posted = report.posted,
            retried = report.retried,
            failed = report.failed,
            skipped = report.skipped,
            errors = report.errors,
            "Tick complete"
        );
        report
    }

    async fn process_post(&self, post: ScheduledPost, now: i64) -> Disposition {
        debug!(
            post_id = %post.id,
            retry_count = post.retry_count,
            platforms = post.platforms.len(),
            "Dispatching post"
        );

        let outcome = self.dispatcher.dispatch(&post, now).await;
        let transition = self
            .policy
            .decide(&outcome.aggregate(), post.retry_count, now);

        match self.store.apply_transition(&post, &transition, now).await {
            Ok(true) => {
                log_transition(&post, &transition);
                match transition {
                    Transition::Posted { .. } => Disposition::Posted,
                    Transition::Retry { .. } => Disposition::Retried,
                    Transition::Failed { .. } => Disposition::Failed,
                }
            }
            Ok(false) => {
                warn!(
                    post_id = %post.id,
                    "Post changed during dispatch (cancelled or already processed); result discarded"
                );
                Disposition::Skipped
            }
            Err(e) => {
                // The row is untouched, so the post is picked up again next tick
                error!(post_id = %post.id, error = %e, "Failed to record post status");
                Disposition::Error
            }
        }
    }
}

fn log_transition(post: &ScheduledPost, transition: &Transition) {
    match transition {
        Transition::Posted { error_message: None } => {
            info!(post_id = %post.id, "Post published to all platforms")
        }
        Transition::Posted {
            error_message: Some(message),
        } => warn!(post_id = %post.id, %message, "Post partially published"),
        Transition::Retry {
            retry_count,
            error_message,
            next_attempt_at,
        } => warn!(
            post_id = %post.id,
            retry_count,
            next_attempt_at = ?next_attempt_at,
            message = %error_message,
            "Post failed on every platform, will retry"
        ),
        Transition::Failed { error_message } => error!(
            post_id = %post.id,
            retry_count = post.retry_count,
            message = %error_message,
            "Post marked failed"
        ),
    }
}
