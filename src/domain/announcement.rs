//! Exchange announcement model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single entry of the exchange announcements feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub title: String,
    pub description: String,
    pub url: String,
    /// Publication time in Unix milliseconds.
    pub timestamp_ms: i64,
    /// Feed tags, e.g. "Launchpool".
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Announcement {
    /// Publication time as a UTC timestamp.
    pub fn published_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp_ms).unwrap_or_default()
    }

    /// Returns true if the announcement carries `tag` (case-insensitive).
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}
