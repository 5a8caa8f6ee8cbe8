//! Trading configuration: traded symbol, sizing limits and default risk parameters.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use super::duration::{self, non_zero_or};
use crate::domain::RiskParameters;

const DEFAULT_SYMBOL: &str = "MNTUSDT";
const DEFAULT_SETTINGS_PATH: &str = "data/settings.yaml";
const DEFAULT_POST_FILL_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_PRICE_PRECISION: u32 = 4;

/// Trading settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Linear contract traded on every trigger.
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Smallest accepted order notional in USDT.
    #[serde(default = "default_min_notional")]
    pub min_notional: Decimal,
    /// File holding the operator-edited risk parameters and password hash.
    #[serde(default = "default_settings_path")]
    pub settings_path: String,
    /// Upper bound for each best-effort call after a fill.
    #[serde(default, with = "duration")]
    pub post_fill_timeout: Duration,
    /// How long fetched lot size rules are reused. Zero refetches per trade.
    #[serde(default, with = "duration")]
    pub rules_cache_ttl: Duration,
    /// Decimal places for stop/target prices when the exchange gives no tick size.
    #[serde(default = "default_price_precision")]
    pub price_precision: u32,
    /// Risk parameters used until the operator saves their own.
    #[serde(default)]
    pub defaults: RiskParameters,
}

impl TradingConfig {
    pub fn post_fill_timeout(&self) -> Duration {
        non_zero_or(self.post_fill_timeout, DEFAULT_POST_FILL_TIMEOUT)
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            min_notional: default_min_notional(),
            settings_path: default_settings_path(),
            post_fill_timeout: Duration::ZERO,
            rules_cache_ttl: Duration::ZERO,
            price_precision: DEFAULT_PRICE_PRECISION,
            defaults: RiskParameters::default(),
        }
    }
}

fn default_symbol() -> String {
    DEFAULT_SYMBOL.to_string()
}

fn default_min_notional() -> Decimal {
    Decimal::new(5, 0)
}

fn default_settings_path() -> String {
    DEFAULT_SETTINGS_PATH.to_string()
}

fn default_price_precision() -> u32 {
    DEFAULT_PRICE_PRECISION
}
