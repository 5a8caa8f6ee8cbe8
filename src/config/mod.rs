//! Configuration loading and validation for the listing bot.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides for sensitive credentials.

mod announcements;
mod app;
mod duration;
mod error;
mod exchange;
mod monitor;
mod notification;
mod trading;

pub use announcements::AnnouncementsConfig;
pub use app::AppConfig;
pub use error::ConfigError;
pub use exchange::ExchangeConfig;
pub use monitor::MonitorConfig;
pub use notification::{NotificationConfig, TelegramConfig};
pub use trading::TradingConfig;

use rust_decimal::Decimal;
use serde::Deserialize;
use std::{env, fs};

/// Root configuration structure for the listing bot.
///
/// Required sections: app.
/// Optional sections: exchange, trading, announcements, monitor, notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Bybit connection settings.
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Traded symbol, sizing limits and default risk parameters.
    #[serde(default)]
    pub trading: TradingConfig,
    /// Announcement feed polling.
    #[serde(default)]
    pub announcements: AnnouncementsConfig,
    /// Open position monitoring.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Telegram alerts and operator menu (optional).
    pub notification: Option<NotificationConfig>,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// First loads environment variables from `.env` file (if exists),
    /// then loads YAML config and credentials from environment variables:
    /// - `BYBIT_API_KEY`, `BYBIT_API_SECRET`
    /// - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        config.load_credentials_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Returns the Telegram section if it is present and enabled.
    pub fn telegram(&self) -> Option<&TelegramConfig> {
        self.notification
            .as_ref()
            .and_then(|n| n.telegram.as_ref())
            .filter(|t| t.enabled)
    }

    /// Load credentials from environment variables.
    fn load_credentials_from_env(&mut self) {
        self.exchange.api_key = env::var("BYBIT_API_KEY").unwrap_or_default();
        self.exchange.api_secret = env::var("BYBIT_API_SECRET").unwrap_or_default();

        if let Some(ref mut notification) = self.notification {
            if let Some(ref mut telegram) = notification.telegram {
                if telegram.enabled {
                    telegram.bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
                    telegram.chat_id = env::var("TELEGRAM_CHAT_ID").unwrap_or_default();
                }
            }
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        if self.trading.symbol.trim().is_empty() {
            return Err(ConfigError::Validation("trading.symbol is required".into()));
        }

        if self.trading.min_notional <= Decimal::ZERO {
            return Err(ConfigError::Validation(
                "trading.min_notional must be positive".into(),
            ));
        }

        if let Err(e) = self.trading.defaults.validate(self.trading.min_notional) {
            return Err(ConfigError::Validation(format!("trading.defaults: {}", e)));
        }

        if self.monitor.proximity_pct <= Decimal::ZERO
            || self.monitor.proximity_pct >= Decimal::ONE_HUNDRED
        {
            return Err(ConfigError::Validation(
                "monitor.proximity_pct must be between 0 and 100".into(),
            ));
        }

        if self.announcements.limit == 0 {
            return Err(ConfigError::Validation(
                "announcements.limit must be positive".into(),
            ));
        }

        if !self.app.is_production() {
            return Ok(());
        }

        if self.exchange.api_key.is_empty() || self.exchange.api_secret.is_empty() {
            return Err(ConfigError::Validation(
                "exchange: API credentials not found (set BYBIT_API_KEY and BYBIT_API_SECRET env vars)"
                    .into(),
            ));
        }

        if let Some(telegram) = self.telegram() {
            if telegram.bot_token.is_empty() || telegram.chat_id.is_empty() {
                return Err(ConfigError::Validation(
                    "telegram: credentials not found (set TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID env vars)"
                        .into(),
                ));
            }
        }

        Ok(())
    }
}
