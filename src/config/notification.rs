//! Notification configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration::{self, non_zero_or};

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_OVERVIEW_INTERVAL: Duration = Duration::from_secs(3600);

/// Notification settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Telegram bot: alerts plus the operator menu.
    pub telegram: Option<TelegramConfig>,
}

/// Telegram settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Whether the Telegram bot is active.
    #[serde(default)]
    pub enabled: bool,
    /// Bot token (loaded from TELEGRAM_BOT_TOKEN env var).
    #[serde(skip)]
    pub bot_token: String,
    /// The only chat allowed to talk to the bot (loaded from TELEGRAM_CHAT_ID env var).
    #[serde(skip)]
    pub chat_id: String,
    /// Long-poll timeout for getUpdates.
    #[serde(default, with = "duration")]
    pub poll_timeout: Duration,
    /// Send alerts for new listing announcements.
    #[serde(default = "default_true")]
    pub notify_announcements: bool,
    /// Send position proximity and closure alerts.
    #[serde(default = "default_true")]
    pub notify_positions: bool,
    /// Send alerts when errors occur.
    #[serde(default = "default_true")]
    pub notify_errors: bool,
    /// Send periodic overview notifications with stats.
    #[serde(default)]
    pub notify_overview: bool,
    /// Interval between overview notifications (default: 1h).
    #[serde(default, with = "duration")]
    pub overview_interval: Duration,
}

impl TelegramConfig {
    pub fn poll_timeout(&self) -> Duration {
        non_zero_or(self.poll_timeout, DEFAULT_POLL_TIMEOUT)
    }

    pub fn overview_interval(&self) -> Duration {
        non_zero_or(self.overview_interval, DEFAULT_OVERVIEW_INTERVAL)
    }
}

fn default_true() -> bool {
    true
}
