//! Application-level configuration.

use serde::Deserialize;

/// Default number of consecutive task failures before the bot reports itself degraded.
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Application-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Application name used in logs and notifications.
    pub name: String,
    /// Environment: "development", "staging", or "production".
    pub env: String,
    /// Logging verbosity: "debug", "info", "warn", "error".
    pub log_level: Option<String>,
    /// Consecutive failures of a periodic task before a "degraded" alert.
    pub max_consecutive_failures: Option<u32>,
}

impl AppConfig {
    /// Returns true outside the development environment.
    pub fn is_production(&self) -> bool {
        self.env != "development"
    }

    /// Effective degradation threshold.
    pub fn failure_threshold(&self) -> u32 {
        self.max_consecutive_failures
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_CONSECUTIVE_FAILURES)
    }
}
