//! Twitter/X publishing through the v2 API

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::credentials::Credential;
use crate::error::PlatformError;
use crate::platforms::{check_length, http, text_with_links, PlatformAdapter};
use crate::types::PlatformKind;

const CHARACTER_LIMIT: usize = 280;

pub struct TwitterAdapter {
    client: Client,
    api_base: String,
}

impl TwitterAdapter {
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for TwitterAdapter {
    async fn publish(
        &self,
        content: &str,
        media_urls: &[String],
        credential: &Credential,
    ) -> Result<String, PlatformError> {
        let text = text_with_links(content, media_urls);
        check_length(PlatformKind::Twitter, &text, CHARACTER_LIMIT)?;

        let request = self
            .client
            .post(format!("{}/2/tweets", self.api_base))
            .bearer_auth(credential.token())
            .json(&json!({ "text": text }));

        let response = http::send_json(PlatformKind::Twitter, request).await?;
        http::id_at(PlatformKind::Twitter, &response, "/data/id")
    }

    fn kind(&self) -> PlatformKind {
        PlatformKind::Twitter
    }
}
