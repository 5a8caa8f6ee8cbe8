//! Watermark-based detection of new announcements.

use std::sync::Arc;

use tracing::{debug, info};

use super::{AnnouncementFeed, FeedError};
use crate::domain::Announcement;

/// Polls a feed and emits at most one new announcement per poll.
///
/// Only the newest item of each page is inspected. When two qualifying
/// announcements land between two polls, the older one is never emitted.
pub struct AnnouncementWatcher {
    feed: Arc<dyn AnnouncementFeed>,
    tag: String,
    category: Option<String>,
    watermark_ms: i64,
}

impl AnnouncementWatcher {
    /// Creates a watcher that ignores everything published at or before
    /// `watermark_ms`.
    pub fn new(
        feed: Arc<dyn AnnouncementFeed>,
        tag: impl Into<String>,
        category: Option<String>,
        watermark_ms: i64,
    ) -> Self {
        Self {
            feed,
            tag: tag.into(),
            category,
            watermark_ms,
        }
    }

    /// Timestamp (Unix ms) of the last emitted announcement, or the start
    /// watermark if nothing was emitted yet.
    pub fn watermark(&self) -> i64 {
        self.watermark_ms
    }

    /// Fetches the feed once.
    ///
    /// Returns `Ok(Some(_))` only for an item strictly newer than the
    /// watermark, advancing the watermark to its timestamp. Feed failures
    /// leave the watermark untouched. The watermark moves on emission
    /// regardless of what the caller does with the item.
    pub async fn poll_once(&mut self) -> Result<Option<Announcement>, FeedError> {
        let items = self
            .feed
            .fetch_latest(&self.tag, self.category.as_deref())
            .await?;

        let Some(latest) = items.into_iter().next() else {
            debug!(tag = %self.tag, "feed is empty");
            return Ok(None);
        };

        if !latest.has_tag(&self.tag) {
            debug!(title = %latest.title, tag = %self.tag, "newest item lacks the tag, skipping");
            return Ok(None);
        }

        if latest.timestamp_ms <= self.watermark_ms {
            debug!(
                title = %latest.title,
                published = latest.timestamp_ms,
                watermark = self.watermark_ms,
                "no new announcement"
            );
            return Ok(None);
        }

        info!(
            title = %latest.title,
            published = latest.timestamp_ms,
            previous_watermark = self.watermark_ms,
            "new announcement"
        );
        self.watermark_ms = latest.timestamp_ms;

        Ok(Some(latest))
    }
}
