//! Exchange integration abstractions and the Bybit implementation.

pub mod bybit;
mod utils;

#[cfg(test)]
pub(crate) mod mock;

use crate::domain::{ClosedPnl, InstrumentRules, Order, OrderSide, PlacedOrder, Position};
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Exchange errors.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The request never reached the exchange.
    #[error("connection error: {0}")]
    Connection(String),

    /// The request was sent but no complete answer arrived.
    #[error("request timed out or was interrupted: {0}")]
    Timeout(String),

    /// Credentials were refused (invalid key, bad signature, expired key).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The exchange or the local budget throttled the request.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Insufficient funds for the operation.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Symbol or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// API error from the exchange.
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    /// The exchange answered with something we could not read.
    #[error("unexpected response: {0}")]
    Parse(String),
}

impl ExchangeError {
    /// True when the outcome of a state-changing request is unknown.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, ExchangeError::Timeout(_) | ExchangeError::Parse(_))
    }
}

/// Result type for exchange operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Exchange defines what the bot needs from a derivatives exchange.
///
/// One long-lived instance is shared by the executor, the position monitor
/// and the chat menu.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Connect checks API reachability and clock drift.
    async fn connect(&self) -> Result<()>;

    /// GetMarkPrice returns the current reference price of `symbol`.
    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal>;

    /// GetInstrumentRules returns the lot size rules of `symbol`.
    async fn get_instrument_rules(&self, symbol: &str) -> Result<InstrumentRules>;

    /// PlaceMarketOrder submits a market order for `quantity` contracts.
    /// An error means the exchange did not accept the order, unless
    /// [`ExchangeError::is_ambiguous`] says otherwise.
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<PlacedOrder>;

    /// SetLeverage sets the leverage for both sides of `symbol`.
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    /// SetProtectiveLevels attaches stop-loss and take-profit to the open position.
    async fn set_protective_levels(
        &self,
        symbol: &str,
        stop_loss: Decimal,
        take_profit: Decimal,
    ) -> Result<()>;

    /// GetOpenPosition returns the open position, or `None` when flat.
    async fn get_open_position(&self, symbol: &str) -> Result<Option<Position>>;

    /// GetRecentOrders returns the newest orders first.
    async fn get_recent_orders(&self, symbol: &str, limit: u32) -> Result<Vec<Order>>;

    /// GetClosedPnl returns realized PnL records, newest first.
    async fn get_closed_pnl(&self, symbol: &str, limit: u32) -> Result<Vec<ClosedPnl>>;

    /// GetWalletBalance returns the wallet balance of `asset`.
    async fn get_wallet_balance(&self, asset: &str) -> Result<Decimal>;

    /// Name returns the unique identifier of this exchange (e.g., "bybit").
    fn name(&self) -> &str;
}
