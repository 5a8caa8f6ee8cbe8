//! Runtime statistics for the bot.

use crate::domain::TradeResult;

/// Runtime statistics for the bot.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub polls: u64,
    pub poll_failures: u64,
    pub announcements: u64,
    pub trades_attempted: u64,
    pub successful_trades: u64,
    pub failed_trades: u64,
    /// Fills that left the position without leverage or stop/target levels.
    pub degraded_fills: u64,
}

impl Stats {
    pub fn record_trade(&mut self, result: &TradeResult) {
        self.trades_attempted += 1;
        match result {
            TradeResult::Filled(fill) => {
                self.successful_trades += 1;
                if fill.is_degraded() {
                    self.degraded_fills += 1;
                }
            }
            TradeResult::Failed(_) => self.failed_trades += 1,
        }
    }
}
