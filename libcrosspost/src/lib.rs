//! Crosspost - scheduled publishing to social networks
//!
//! Posts are stored with a target time and a list of platforms. A background
//! loop picks up due posts, publishes each one to all of its platforms
//! concurrently and records whether it was posted, should be retried or has
//! failed for good.

pub mod config;
pub mod credentials;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod platforms;
pub mod rate_limiter;
pub mod retry;
pub mod scheduler;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{Credential, CredentialResolver, SqliteCredentialResolver};
pub use db::{Database, PostStore};
pub use dispatch::{AggregateOutcome, DispatchOutcome, Dispatcher, PlatformResult};
pub use error::{CrosspostError, PlatformError, Result};
pub use lifecycle::ScheduledPostProcessor;
pub use platforms::{AdapterRegistry, PlatformAdapter};
pub use retry::{RetryPolicy, Transition};
pub use scheduler::{Scheduler, TickReport};
pub use types::{NewScheduledPost, PlatformKind, PostEdit, PostStatus, ScheduledPost};
