//! Bot error types.

use crate::announcements::FeedError;
use crate::config::ConfigError;
use crate::exchanges::ExchangeError;
use crate::settings::SettingsError;

/// Bot error type.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("bot is already running")]
    AlreadyRunning,
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("announcement feed error: {0}")]
    Feed(#[from] FeedError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
}
