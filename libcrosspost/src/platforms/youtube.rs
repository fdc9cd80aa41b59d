//! YouTube channel publishing through the Data API

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::credentials::Credential;
use crate::error::PlatformError;
use crate::platforms::{http, PlatformAdapter};
use crate::types::PlatformKind;

const TITLE_LIMIT: usize = 100;
const DESCRIPTION_LIMIT: usize = 5000;

pub struct YoutubeAdapter {
    client: Client,
    api_base: String,
}

impl YoutubeAdapter {
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }
}

/// First non-empty line of the post, cut to the title limit
fn title_from(content: &str) -> String {
    let line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("Untitled");
    line.chars().take(TITLE_LIMIT).collect()
}

#[async_trait]
impl PlatformAdapter for YoutubeAdapter {
    async fn publish(
        &self,
        content: &str,
        media_urls: &[String],
        credential: &Credential,
    ) -> Result<String, PlatformError> {
        let Some(video) = media_urls.first() else {
            return Err(PlatformError::Validation(
                "YouTube posts require a video url".to_string(),
            ));
        };
        if content.chars().count() > DESCRIPTION_LIMIT {
            return Err(PlatformError::Validation(format!(
                "Description exceeds YouTube's {} character limit",
                DESCRIPTION_LIMIT
            )));
        }

        let body = json!({
            "snippet": {
                "title": title_from(content),
                "description": content,
                "channelId": credential.account_id,
            },
            "status": { "privacyStatus": "public" },
            "fileDetails": { "fileName": video },
        });

        let request = self
            .client
            .post(format!("{}/videos", self.api_base))
            .query(&[("part", "snippet,status")])
            .bearer_auth(credential.token())
            .json(&body);

        let response = http::send_json(PlatformKind::Youtube, request).await?;
        http::id_at(PlatformKind::Youtube, &response, "/id")
    }

    fn kind(&self) -> PlatformKind {
        PlatformKind::Youtube
    }
}
