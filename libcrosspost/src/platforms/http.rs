//! Shared HTTP plumbing for the REST adapters

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::error::{CrosspostError, PlatformError};
use crate::types::PlatformKind;

/// Longest slice of a response body kept in error messages
const MAX_BODY_IN_ERROR: usize = 200;

/// Slack between the dispatcher's call timeout and the client's own deadline
const CLIENT_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Build the shared client for a given per-call timeout
///
/// The client deadline sits past `call_timeout` so an overrunning call is
/// always reported by the dispatcher as `PlatformError::Timeout`.
pub fn build_client(call_timeout: Duration) -> crate::error::Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10).min(call_timeout / 2))
        .timeout(call_timeout + CLIENT_TIMEOUT_GRACE)
        .user_agent(concat!("crosspost/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CrosspostError::Lifecycle(format!("failed to build HTTP client: {}", e)))
}

/// Map a non-success HTTP status to a platform error
pub fn classify_status(platform: PlatformKind, status: StatusCode, body: &str) -> PlatformError {
    let detail = format!("{} returned HTTP {}: {}", platform, status.as_u16(), truncate(body));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Authentication(detail),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimit(detail),
        s if s.is_server_error() => PlatformError::Server(detail),
        s if s.is_client_error() => PlatformError::Validation(detail),
        _ => PlatformError::Posting(detail),
    }
}

/// Map a transport failure (no HTTP status received)
pub fn map_transport_error(platform: PlatformKind, error: reqwest::Error) -> PlatformError {
    if error.is_connect() {
        PlatformError::Network(format!("{} could not be reached: {}", platform, error))
    } else if let Some(status) = error.status() {
        classify_status(platform, status, &error.to_string())
    } else {
        PlatformError::Network(format!("{} request failed: {}", platform, error))
    }
}

/// Send a request and decode a JSON body, classifying every failure
pub async fn send_json(platform: PlatformKind, request: RequestBuilder) -> Result<Value, PlatformError> {
    let response = request
        .send()
        .await
        .map_err(|e| map_transport_error(platform, e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| map_transport_error(platform, e))?;

    if !status.is_success() {
        return Err(classify_status(platform, status, &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        PlatformError::Posting(format!(
            "{} returned an unreadable response: {} ({})",
            platform,
            e,
            truncate(&body)
        ))
    })
}

/// Extract an id at a JSON pointer; ids may be strings or numbers
pub fn id_at(platform: PlatformKind, body: &Value, pointer: &str) -> Result<String, PlatformError> {
    match body.pointer(pointer) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(PlatformError::Posting(format!(
            "{} response is missing '{}': {}",
            platform,
            pointer,
            truncate(&body.to_string())
        ))),
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_BODY_IN_ERROR) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_status() {
        let p = PlatformKind::Twitter;
        assert!(matches!(
            classify_status(p, StatusCode::UNAUTHORIZED, ""),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            classify_status(p, StatusCode::FORBIDDEN, ""),
            PlatformError::Authentication(_)
        ));
        assert!(matches!(
            classify_status(p, StatusCode::TOO_MANY_REQUESTS, ""),
            PlatformError::RateLimit(_)
        ));
        assert!(matches!(
            classify_status(p, StatusCode::BAD_GATEWAY, ""),
            PlatformError::Server(_)
        ));
        assert!(matches!(
            classify_status(p, StatusCode::UNPROCESSABLE_ENTITY, ""),
            PlatformError::Validation(_)
        ));
        assert!(matches!(
            classify_status(p, StatusCode::MOVED_PERMANENTLY, ""),
            PlatformError::Posting(_)
        ));
    }

    #[test]
    fn test_classify_status_message() {
        let err = classify_status(
            PlatformKind::Facebook,
            StatusCode::INTERNAL_SERVER_ERROR,
            "upstream exploded",
        );
        assert_eq!(
            err.to_string(),
            "Server error: facebook returned HTTP 500: upstream exploded"
        );
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(1_000);
        let err = classify_status(PlatformKind::Youtube, StatusCode::BAD_REQUEST, &body);
        assert!(err.to_string().len() < 300);
    }

    #[test]
    fn test_id_at_accepts_strings_and_numbers() {
        let body = json!({"data": {"id": "123"}, "result": {"message_id": 42}});
        assert_eq!(id_at(PlatformKind::Twitter, &body, "/data/id").unwrap(), "123");
        assert_eq!(
            id_at(PlatformKind::Telegram, &body, "/result/message_id").unwrap(),
            "42"
        );

        let err = id_at(PlatformKind::Twitter, &body, "/id").unwrap_err();
        assert!(matches!(err, PlatformError::Posting(_)));
    }

    #[test]
    fn test_build_client() {
        assert!(build_client(Duration::from_secs(30)).is_ok());
        assert!(build_client(Duration::from_secs(2)).is_ok());
    }
}
