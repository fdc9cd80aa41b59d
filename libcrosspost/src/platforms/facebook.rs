//! Facebook page publishing through the Graph API

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::credentials::Credential;
use crate::error::PlatformError;
use crate::platforms::{http, PlatformAdapter};
use crate::types::PlatformKind;

pub struct FacebookAdapter {
    client: Client,
    api_base: String,
}

impl FacebookAdapter {
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    async fn publish(
        &self,
        content: &str,
        media_urls: &[String],
        credential: &Credential,
    ) -> Result<String, PlatformError> {
        // A photo post carries the text as its caption
        let (url, body) = match media_urls.first() {
            Some(photo) => (
                format!("{}/{}/photos", self.api_base, credential.account_id),
                json!({ "url": photo, "caption": content }),
            ),
            None => (
                format!("{}/{}/feed", self.api_base, credential.account_id),
                json!({ "message": content }),
            ),
        };

        let request = self
            .client
            .post(url)
            .query(&[("access_token", credential.token())])
            .json(&body);

        let response = http::send_json(PlatformKind::Facebook, request).await?;

        // Photo uploads return the feed story as `post_id`
        http::id_at(PlatformKind::Facebook, &response, "/post_id")
            .or_else(|_| http::id_at(PlatformKind::Facebook, &response, "/id"))
    }

    fn kind(&self) -> PlatformKind {
        PlatformKind::Facebook
    }
}
