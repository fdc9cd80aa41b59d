//! Telegram channel publishing through the Bot API
//!
//! The access token is the bot token and the account id is the target chat.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::credentials::Credential;
use crate::error::PlatformError;
use crate::platforms::{check_length, http, PlatformAdapter};
use crate::types::PlatformKind;

const MESSAGE_LIMIT: usize = 4096;
const CAPTION_LIMIT: usize = 1024;

pub struct TelegramAdapter {
    client: Client,
    api_base: String,
}

impl TelegramAdapter {
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }
}

/// Bot API bodies with `ok: false` carry the real status in `error_code`
fn check_ok(body: &Value) -> Result<(), PlatformError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }

    let description = body
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("request rejected");
    let status = body
        .get("error_code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .and_then(|code| StatusCode::from_u16(code).ok());

    Err(match status {
        Some(status) => http::classify_status(PlatformKind::Telegram, status, description),
        None => PlatformError::Posting(format!("telegram: {}", description)),
    })
}

#[async_trait]
impl PlatformAdapter for TelegramAdapter {
    async fn publish(
        &self,
        content: &str,
        media_urls: &[String],
        credential: &Credential,
    ) -> Result<String, PlatformError> {
        let (method, body) = match media_urls.first() {
            Some(photo) => {
                check_length(PlatformKind::Telegram, content, CAPTION_LIMIT)?;
                (
                    "sendPhoto",
                    json!({ "chat_id": credential.account_id, "photo": photo, "caption": content }),
                )
            }
            None => {
                check_length(PlatformKind::Telegram, content, MESSAGE_LIMIT)?;
                (
                    "sendMessage",
                    json!({ "chat_id": credential.account_id, "text": content }),
                )
            }
        };

        let request = self
            .client
            .post(format!("{}/bot{}/{}", self.api_base, credential.token(), method))
            .json(&body);

        let response = match http::send_json(PlatformKind::Telegram, request).await {
            Ok(response) => response,
            // Keep the bot token out of error messages
            Err(e) => return Err(redact(e, credential.token())),
        };
        check_ok(&response)?;
        http::id_at(PlatformKind::Telegram, &response, "/result/message_id")
    }

    fn kind(&self) -> PlatformKind {
        PlatformKind::Telegram
    }
}

fn redact(error: PlatformError, token: &str) -> PlatformError {
    if token.is_empty() {
        return error;
    }
    let scrub = |msg: String| msg.replace(token, "[REDACTED]");
    match error {
        PlatformError::Authentication(m) => PlatformError::Authentication(scrub(m)),
        PlatformError::Validation(m) => PlatformError::Validation(scrub(m)),
        PlatformError::Posting(m) => PlatformError::Posting(scrub(m)),
        PlatformError::Network(m) => PlatformError::Network(scrub(m)),
        PlatformError::RateLimit(m) => PlatformError::RateLimit(scrub(m)),
        PlatformError::Server(m) => PlatformError::Server(scrub(m)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> TelegramAdapter {
        TelegramAdapter::new(
            http::build_client(Duration::from_secs(5)).unwrap(),
            server.uri(),
        )
    }

    #[tokio::test]
    async fn test_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_json(json!({"chat_id": "@channel", "text": "Hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 77}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = Credential::new("@channel", "123:abc", 0);
        let id = adapter(&server)
            .publish("Hello", &[], &credential)
            .await
            .unwrap();
        assert_eq!(id, "77");
    }

    #[tokio::test]
    async fn test_send_photo_with_caption() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendPhoto"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 78}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = Credential::new("@channel", "123:abc", 0);
        let media = vec!["https://cdn.example.com/a.jpg".to_string()];
        let id = adapter(&server)
            .publish("Caption", &media, &credential)
            .await
            .unwrap();
        assert_eq!(id, "78");
    }

    #[tokio::test]
    async fn test_ok_false_maps_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 5"
            })))
            .mount(&server)
            .await;

        let credential = Credential::new("@channel", "123:abc", 0);
        let err = adapter(&server)
            .publish("Hello", &[], &credential)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::RateLimit(_)));
    }

    #[tokio::test]
    async fn test_http_error_does_not_leak_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized bot 123:abc"))
            .mount(&server)
            .await;

        let credential = Credential::new("@channel", "123:abc", 0);
        let err = adapter(&server)
            .publish("Hello", &[], &credential)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Authentication(_)));
        assert!(!err.to_string().contains("123:abc"));
    }

    #[test]
    fn test_check_ok_without_error_code() {
        let err = check_ok(&json!({"ok": false, "description": "chat not found"})).unwrap_err();
        assert!(matches!(err, PlatformError::Posting(_)));
        assert!(check_ok(&json!({"ok": true})).is_ok());
    }

    #[test]
    fn test_check_ok_bad_request() {
        let err = check_ok(&json!({"ok": false, "error_code": 400, "description": "Bad Request: chat not found"}))
            .unwrap_err();
        assert!(matches!(err, PlatformError::Validation(_)));
    }
}
