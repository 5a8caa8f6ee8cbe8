//! Position monitor configuration.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use super::duration::{self, non_zero_or};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

/// Position monitor settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Time between position checks.
    #[serde(default, with = "duration")]
    pub interval: Duration,
    /// Distance to a stop/target level, in percent, that raises a warning.
    #[serde(default = "default_proximity_pct")]
    pub proximity_pct: Decimal,
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        non_zero_or(self.interval, DEFAULT_INTERVAL)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::ZERO,
            proximity_pct: default_proximity_pct(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_proximity_pct() -> Decimal {
    Decimal::ONE
}
