//! Mastodon publishing
//!
//! Uses the megalodon library, so any Fediverse server that implements the
//! Mastodon statuses API (Pleroma, Akkoma, GoToSocial, ...) works as well.
//! A client is generated per call because the token belongs to the post's
//! owner, not to the daemon.

use async_trait::async_trait;
use megalodon::{Megalodon, SNS};
use reqwest::StatusCode;

use crate::credentials::Credential;
use crate::error::PlatformError;
use crate::platforms::{check_length, http, text_with_links, PlatformAdapter};
use crate::types::PlatformKind;

const DEFAULT_CHARACTER_LIMIT: usize = 500;

pub struct MastodonAdapter {
    /// The instance URL (e.g., "https://mastodon.social")
    instance_url: String,
    character_limit: usize,
}

impl MastodonAdapter {
    pub fn new(instance_url: impl Into<String>) -> Self {
        let instance_url = instance_url.into();
        // Ensure instance URL has a scheme
        let instance_url =
            if instance_url.starts_with("http://") || instance_url.starts_with("https://") {
                instance_url
            } else {
                format!("https://{}", instance_url)
            };

        Self {
            instance_url,
            character_limit: DEFAULT_CHARACTER_LIMIT,
        }
    }

    /// Instances may raise the 500 character default
    pub fn with_character_limit(mut self, limit: usize) -> Self {
        self.character_limit = limit;
        self
    }

    fn client(&self, token: &str) -> Result<Box<dyn Megalodon + Send + Sync>, PlatformError> {
        megalodon::generator(
            SNS::Mastodon,
            self.instance_url.clone(),
            Some(token.to_string()),
            None,
        )
        .map_err(|e| {
            PlatformError::Authentication(format!("Failed to create Mastodon client: {}", e))
        })
    }
}

#[async_trait]
impl PlatformAdapter for MastodonAdapter {
    async fn publish(
        &self,
        content: &str,
        media_urls: &[String],
        credential: &Credential,
    ) -> Result<String, PlatformError> {
        let status = text_with_links(content, media_urls);
        check_length(PlatformKind::Mastodon, &status, self.character_limit)?;

        let response = self
            .client(credential.token())?
            .post_status(status, None)
            .await
            .map_err(|e| map_megalodon_error(e, "post status"))?;

        let post_id = match response.json {
            megalodon::megalodon::PostStatusOutput::Status(status) => status.id,
            megalodon::megalodon::PostStatusOutput::ScheduledStatus(scheduled) => scheduled.id,
        };

        Ok(post_id)
    }

    fn kind(&self) -> PlatformKind {
        PlatformKind::Mastodon
    }
}

fn map_megalodon_error(error: megalodon::error::Error, context: &str) -> PlatformError {
    classify_message(&error.to_string(), context)
}

/// Classify a megalodon error from its message
///
/// megalodon does not expose the response status as a field, so the status
/// is recovered from the text when present and mapped like every other
/// adapter. Without a status the message wording decides.
fn classify_message(message: &str, context: &str) -> PlatformError {
    if let Some(status) = extract_http_status(message).and_then(|c| StatusCode::from_u16(c).ok()) {
        return http::classify_status(
            PlatformKind::Mastodon,
            status,
            &format!("{} ({})", message, context),
        );
    }

    let detail = format!("mastodon {}: {}", context, message);
    let lower = message.to_lowercase();

    if lower.contains("unauthorized") || lower.contains("forbidden") || lower.contains("token") {
        PlatformError::Authentication(detail)
    } else if lower.contains("rate limit") || lower.contains("too many requests") {
        PlatformError::RateLimit(detail)
    } else if lower.contains("unprocessable") || lower.contains("validation") {
        PlatformError::Validation(detail)
    } else if lower.contains("parse") || lower.contains("json") || lower.contains("deserialize") {
        PlatformError::Posting(detail)
    } else {
        PlatformError::Network(detail)
    }
}

/// Extract an HTTP status code from an error message
///
/// Looks for patterns like "HTTP 401", "status 403" or a standalone
/// "422:".
fn extract_http_status(message: &str) -> Option<u16> {
    let valid = |code: u16| (100..=599).contains(&code).then_some(code);

    for prefix in ["HTTP ", "status ", "code: ", "status_code: "] {
        if let Some(pos) = message.find(prefix) {
            let code = message[pos + prefix.len()..]
                .get(0..3)
                .and_then(|s| s.parse::<u16>().ok())
                .and_then(valid);
            if code.is_some() {
                return code;
            }
        }
    }

    let bytes = message.as_bytes();
    bytes.windows(4).enumerate().find_map(|(i, w)| {
        let standalone = i == 0 || !bytes[i - 1].is_ascii_digit();
        if standalone
            && w[..3].iter().all(u8::is_ascii_digit)
            && (w[3] == b':' || w[3] == b' ')
        {
            std::str::from_utf8(&w[..3]).ok()?.parse().ok().and_then(valid)
        } else {
            None
        }
    })
}
