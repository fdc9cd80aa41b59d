//! Instagram business account publishing through the Graph API
//!
//! Publishing is two-step: every media url becomes a container, and the
//! container (or a carousel wrapping several) is then published.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::credentials::Credential;
use crate::error::PlatformError;
use crate::platforms::{check_length, http, PlatformAdapter};
use crate::types::PlatformKind;

const CAPTION_LIMIT: usize = 2200;
const MAX_CAROUSEL_ITEMS: usize = 10;
const VIDEO_EXTENSIONS: [&str; 3] = [".mp4", ".mov", ".m4v"];

pub struct InstagramAdapter {
    client: Client,
    api_base: String,
}

impl InstagramAdapter {
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }

    async fn create_container(&self, credential: &Credential, body: Value) -> Result<String, PlatformError> {
        let request = self
            .client
            .post(format!("{}/{}/media", self.api_base, credential.account_id))
            .query(&[("access_token", credential.token())])
            .json(&body);

        let response = http::send_json(PlatformKind::Instagram, request).await?;
        http::id_at(PlatformKind::Instagram, &response, "/id")
    }
}

fn is_video(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn media_item(url: &str) -> Value {
    if is_video(url) {
        json!({ "media_type": "VIDEO", "video_url": url })
    } else {
        json!({ "image_url": url })
    }
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    async fn publish(
        &self,
        content: &str,
        media_urls: &[String],
        credential: &Credential,
    ) -> Result<String, PlatformError> {
        if media_urls.is_empty() {
            return Err(PlatformError::Validation(
                "Instagram posts require at least one image or video".to_string(),
            ));
        }
        if media_urls.len() > MAX_CAROUSEL_ITEMS {
            return Err(PlatformError::Validation(format!(
                "Instagram carousels allow at most {} items (got {})",
                MAX_CAROUSEL_ITEMS,
                media_urls.len()
            )));
        }
        check_length(PlatformKind::Instagram, content, CAPTION_LIMIT)?;

        let creation_id = match media_urls {
            [single] => {
                let mut body = media_item(single);
                body["caption"] = json!(content);
                self.create_container(credential, body).await?
            }
            many => {
                let mut children = Vec::with_capacity(many.len());
                for url in many {
                    let mut body = media_item(url);
                    body["is_carousel_item"] = json!(true);
                    children.push(self.create_container(credential, body).await?);
                }
                self.create_container(
                    credential,
                    json!({
                        "media_type": "CAROUSEL",
                        "children": children.join(","),
                        "caption": content,
                    }),
                )
                .await?
            }
        };

        let request = self
            .client
            .post(format!(
                "{}/{}/media_publish",
                self.api_base, credential.account_id
            ))
            .query(&[("access_token", credential.token())])
            .json(&json!({ "creation_id": creation_id }));

        let response = http::send_json(PlatformKind::Instagram, request).await?;
        http::id_at(PlatformKind::Instagram, &response, "/id")
    }

    fn kind(&self) -> PlatformKind {
        PlatformKind::Instagram
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> InstagramAdapter {
        InstagramAdapter::new(
            http::build_client(Duration::from_secs(5)).unwrap(),
            server.uri(),
        )
    }

    #[test]
    fn test_video_detection() {
        assert!(is_video("https://cdn.example.com/clip.MP4"));
        assert!(is_video("https://cdn.example.com/clip.mov?sig=abc"));
        assert!(!is_video("https://cdn.example.com/photo.jpg"));
    }

    #[tokio::test]
    async fn test_requires_media() {
        let server = MockServer::start().await;
        let credential = Credential::new("ig-1", "token", 0);

        let err = adapter(&server)
            .publish("text only", &[], &credential)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_single_image_two_step_publish() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ig-1/media"))
            .and(body_partial_json(json!({
                "image_url": "https://cdn.example.com/a.jpg",
                "caption": "Sunset"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "container-1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ig-1/media_publish"))
            .and(body_partial_json(json!({"creation_id": "container-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "media-99"})))
            .expect(1)
            .mount(&server)
            .await;

        let credential = Credential::new("ig-1", "token", 0);
        let media = vec!["https://cdn.example.com/a.jpg".to_string()];
        let id = adapter(&server)
            .publish("Sunset", &media, &credential)
            .await
            .unwrap();
        assert_eq!(id, "media-99");
    }

    #[tokio::test]
    async fn test_carousel_creates_children_then_parent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ig-1/media"))
            .and(body_partial_json(json!({"is_carousel_item": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "child"})))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ig-1/media"))
            .and(body_partial_json(json!({"media_type": "CAROUSEL", "children": "child,child"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "carousel"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ig-1/media_publish"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "media-100"})))
            .expect(1)
            .mount(&server)
            .await;

        let credential = Credential::new("ig-1", "token", 0);
        let media = vec![
            "https://cdn.example.com/a.jpg".to_string(),
            "https://cdn.example.com/b.mp4".to_string(),
        ];
        let id = adapter(&server)
            .publish("Album", &media, &credential)
            .await
            .unwrap();
        assert_eq!(id, "media-100");
    }

    #[tokio::test]
    async fn test_rate_limited_container_creation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ig-1/media"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let credential = Credential::new("ig-1", "token", 0);
        let media = vec!["https://cdn.example.com/a.jpg".to_string()];
        let err = adapter(&server)
            .publish("Sunset", &media, &credential)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::RateLimit(_)));
    }
}
