//! Error types for Crosspost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosspostError>;

#[derive(Error, Debug)]
pub enum CrosspostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Scheduler error: {0}")]
    Lifecycle(String),
}

impl CrosspostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosspostError::InvalidInput(_) => 3,
            CrosspostError::Config(_) => 2,
            CrosspostError::Platform(_)
            | CrosspostError::Database(_)
            | CrosspostError::NotFound(_)
            | CrosspostError::InvalidState(_)
            | CrosspostError::Lifecycle(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row {id}: {reason}")]
    CorruptRow { id: String, reason: String },
}

/// Failure of a single platform publish attempt.
///
/// Values of this type never escape the dispatch layer as errors: they are
/// captured per platform and folded into the post's error message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("platform not connected")]
    NotConnected,
}

impl PlatformError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Only invalid input is treated as permanent; an expired token or a
    /// missing account can be fixed by the user between attempts.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PlatformError::Validation(_))
    }
}
