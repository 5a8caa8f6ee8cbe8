//! Exchange configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration::{self, non_zero_or};

const DEFAULT_CATEGORY: &str = "linear";
const DEFAULT_RECV_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Bybit connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Use the Bybit testnet instead of mainnet.
    #[serde(default = "default_true")]
    pub testnet: bool,
    /// Product category for derivatives endpoints.
    #[serde(default = "default_category")]
    pub category: String,
    /// API key (loaded from BYBIT_API_KEY).
    #[serde(skip)]
    pub api_key: String,
    /// API secret (loaded from BYBIT_API_SECRET).
    #[serde(skip)]
    pub api_secret: String,
    /// Validity window of a signed request.
    #[serde(default, with = "duration")]
    pub recv_window: Duration,
    /// Timeout applied to every HTTP call.
    #[serde(default, with = "duration")]
    pub request_timeout: Duration,
    /// Maximum API requests per minute.
    pub rate_limit: Option<i32>,
}

impl ExchangeConfig {
    pub fn recv_window(&self) -> Duration {
        non_zero_or(self.recv_window, DEFAULT_RECV_WINDOW)
    }

    pub fn request_timeout(&self) -> Duration {
        non_zero_or(self.request_timeout, DEFAULT_REQUEST_TIMEOUT)
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            testnet: true,
            category: default_category(),
            api_key: String::new(),
            api_secret: String::new(),
            recv_window: Duration::ZERO,
            request_timeout: Duration::ZERO,
            rate_limit: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}
