//! Announcement feed polling configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration::{self, non_zero_or};

const DEFAULT_BASE_URL: &str = "https://api.bybit.com";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_TAG: &str = "Launchpool";
const DEFAULT_LOCALE: &str = "en-US";
const DEFAULT_LIMIT: u32 = 20;

/// Announcement watcher settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AnnouncementsConfig {
    /// Whether the watcher runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Announcements API host. Always mainnet; testnet has no feed.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Time between polls.
    #[serde(default, with = "duration")]
    pub poll_interval: Duration,
    /// Tag an announcement must carry to qualify.
    #[serde(default = "default_tag")]
    pub tag: String,
    /// Optional announcement type filter (e.g. "new_crypto").
    pub announcement_type: Option<String>,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Page size requested from the feed.
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl AnnouncementsConfig {
    pub fn poll_interval(&self) -> Duration {
        non_zero_or(self.poll_interval, DEFAULT_POLL_INTERVAL)
    }
}

impl Default for AnnouncementsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_base_url(),
            poll_interval: Duration::ZERO,
            tag: default_tag(),
            announcement_type: None,
            locale: default_locale(),
            limit: DEFAULT_LIMIT,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_tag() -> String {
    DEFAULT_TAG.to_string()
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}
