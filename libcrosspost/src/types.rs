//! Core types for Crosspost

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CrosspostError;

/// External network a post can be published to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Facebook,
    Instagram,
    Youtube,
    Twitter,
    Mastodon,
    Telegram,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 6] = [
        PlatformKind::Facebook,
        PlatformKind::Instagram,
        PlatformKind::Youtube,
        PlatformKind::Twitter,
        PlatformKind::Mastodon,
        PlatformKind::Telegram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::Youtube => "youtube",
            Self::Twitter => "twitter",
            Self::Mastodon => "mastodon",
            Self::Telegram => "telegram",
        }
    }
}

impl FromStr for PlatformKind {
    type Err = CrosspostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "facebook" => Ok(Self::Facebook),
            "instagram" => Ok(Self::Instagram),
            "youtube" => Ok(Self::Youtube),
            "twitter" => Ok(Self::Twitter),
            "mastodon" => Ok(Self::Mastodon),
            "telegram" => Ok(Self::Telegram),
            other => Err(CrosspostError::InvalidInput(format!(
                "Unknown platform '{}'. Valid platforms: facebook, instagram, youtube, twitter, mastodon, telegram",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Posted,
    Failed,
    Cancelled,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Posted => "posted",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the user may still cancel a post in this state
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl FromStr for PostStatus {
    type Err = CrosspostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "posted" => Ok(Self::Posted),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CrosspostError::InvalidInput(format!(
                "Unknown post status '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A post waiting to be (or already) published to one or more platforms
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledPost {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub media_urls: Vec<String>,
    pub platforms: Vec<PlatformKind>,
    /// Unix timestamp (seconds) at which the post becomes due
    pub scheduled_time: i64,
    pub status: PostStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    /// Earliest time a retried post may be attempted again
    pub next_attempt_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ScheduledPost {
    /// Whether the scheduler should pick this post up at `now`
    pub fn is_due(&self, now: i64) -> bool {
        self.status == PostStatus::Pending
            && self.scheduled_time <= now
            && self.next_attempt_at.map_or(true, |at| at <= now)
    }
}

/// Input for creating a scheduled post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScheduledPost {
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
    pub platforms: Vec<PlatformKind>,
    pub scheduled_time: i64,
}

impl NewScheduledPost {
    /// Build the pending row that will be inserted for this input
    pub fn into_post(self, now: i64) -> ScheduledPost {
        ScheduledPost {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id,
            content: self.content,
            media_urls: self.media_urls,
            platforms: self.platforms,
            scheduled_time: self.scheduled_time,
            status: PostStatus::Pending,
            retry_count: 0,
            error_message: None,
            next_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial edit of a pending post; `None` leaves the field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostEdit {
    pub content: Option<String>,
    pub media_urls: Option<Vec<String>>,
    pub platforms: Option<Vec<PlatformKind>>,
    pub scheduled_time: Option<i64>,
}

impl PostEdit {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.media_urls.is_none()
            && self.platforms.is_none()
            && self.scheduled_time.is_none()
    }
}

/// Validate the content fields shared by creation and editing
pub(crate) fn validate_post_fields(
    content: &str,
    media_urls: &[String],
    platforms: &[PlatformKind],
) -> crate::Result<()> {
    if content.trim().is_empty() && media_urls.is_empty() {
        return Err(CrosspostError::InvalidInput(
            "Post must have content or at least one media url".to_string(),
        ));
    }

    if platforms.is_empty() {
        return Err(CrosspostError::InvalidInput(
            "At least one target platform is required".to_string(),
        ));
    }

    for (i, platform) in platforms.iter().enumerate() {
        if platforms[..i].contains(platform) {
            return Err(CrosspostError::InvalidInput(format!(
                "Platform '{}' listed more than once",
                platform
            )));
        }
    }

    Ok(())
}

pub(crate) fn validate_schedule(scheduled_time: i64, now: i64) -> crate::Result<()> {
    if scheduled_time <= now {
        return Err(CrosspostError::InvalidInput(
            "Scheduled time must be in the future".to_string(),
        ));
    }
    Ok(())
}
