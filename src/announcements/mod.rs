//! Announcement feed contract and the new-listing watcher.

mod watcher;

pub use watcher::AnnouncementWatcher;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Announcement;

/// Errors returned by an announcement feed.
///
/// A failed fetch is never an empty list: the watcher must be able to tell
/// "nothing new" from "could not look".
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed unreachable: {0}")]
    Transport(String),

    #[error("feed returned http {0}")]
    Status(u16),

    #[error("feed api error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("malformed feed response: {0}")]
    Parse(String),
}

/// A source of exchange announcements, newest first.
#[async_trait]
pub trait AnnouncementFeed: Send + Sync {
    /// Fetches the latest page of announcements carrying `tag`, optionally
    /// narrowed to one `category`.
    async fn fetch_latest(
        &self,
        tag: &str,
        category: Option<&str>,
    ) -> Result<Vec<Announcement>, FeedError>;
}
