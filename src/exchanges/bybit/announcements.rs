//! Bybit public announcements feed (`/v5/announcements/index`).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::announcements::{AnnouncementFeed, FeedError};
use crate::config::AnnouncementsConfig;
use crate::domain::Announcement;
use crate::exchanges::bybit::client::{Client, ClientConfig, ClientError};

const ANNOUNCEMENTS_ENDPOINT: &str = "/v5/announcements/index";

/// Bybit announcements feed.
pub struct BybitAnnouncementFeed {
    client: Client,
    locale: String,
    limit: u32,
}

impl BybitAnnouncementFeed {
    /// Creates a feed client from the announcements config.
    pub fn from_config(
        config: &AnnouncementsConfig,
        timeout: std::time::Duration,
    ) -> Result<Self, FeedError> {
        let client = Client::new(ClientConfig::public(config.base_url.clone()).with_timeout(timeout))
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            locale: config.locale.clone(),
            limit: config.limit,
        })
    }
}

#[async_trait]
impl AnnouncementFeed for BybitAnnouncementFeed {
    async fn fetch_latest(
        &self,
        tag: &str,
        category: Option<&str>,
    ) -> Result<Vec<Announcement>, FeedError> {
        let mut params = vec![
            ("locale", self.locale.clone()),
            ("tag", tag.to_string()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(category) = category {
            params.push(("type", category.to_string()));
        }

        let resp: AnnouncementList = self
            .client
            .get(ANNOUNCEMENTS_ENDPOINT, &params, false)
            .await
            .map_err(map_feed_error)?;

        debug!(tag = %tag, count = resp.list.len(), "fetched announcements");

        Ok(resp.list.into_iter().map(AnnouncementInfo::into_announcement).collect())
    }
}

fn map_feed_error(err: ClientError) -> FeedError {
    match err {
        // HTTP failures without a JSON envelope carry the status as code.
        ClientError::Api(api) if (100..600).contains(&api.code) => {
            FeedError::Status(api.code as u16)
        }
        ClientError::Api(api) => FeedError::Api {
            code: api.code,
            message: api.message,
        },
        ClientError::Json(e) => FeedError::Parse(e.to_string()),
        ClientError::MissingResult => FeedError::Parse("response has no result".to_string()),
        other => FeedError::Transport(other.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct AnnouncementList {
    #[serde(default)]
    list: Vec<AnnouncementInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnouncementInfo {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
    date_timestamp: i64,
    #[serde(default)]
    tags: Vec<String>,
}

impl AnnouncementInfo {
    fn into_announcement(self) -> Announcement {
        Announcement {
            title: self.title,
            description: self.description,
            url: self.url,
            timestamp_ms: self.date_timestamp,
            tags: self.tags,
        }
    }
}
