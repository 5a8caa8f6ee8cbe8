//! Orders, positions and realized PnL records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// OrderSide represents the direction of an order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Wire name used by the exchange API.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OrderStatus represents the current state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted by the exchange, not yet filled.
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    /// A state this bot does not track.
    Unknown,
}

/// Acknowledgement returned when an order is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order_id: String,
    pub status: OrderStatus,
}

/// An order from the account's recent history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    /// Average fill price; zero when nothing was filled.
    pub avg_price: Decimal,
    pub status: OrderStatus,
    /// True for orders that can only shrink a position (stop/target closes).
    pub reduce_only: bool,
    pub created_at: DateTime<Utc>,
}

/// An open derivatives position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub leverage: Decimal,
}

impl Position {
    /// Unrealized PnL as a percentage of the entry notional.
    ///
    /// Returns `None` when the notional is zero, so callers never see a
    /// division by zero.
    pub fn pnl_pct(&self) -> Option<Decimal> {
        let notional = self.entry_price * self.size;
        if notional.is_zero() {
            return None;
        }
        Some(self.unrealized_pnl / notional * Decimal::ONE_HUNDRED)
    }
}

/// Realized PnL of a closed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPnl {
    pub order_id: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub closed_pnl: Decimal,
    pub closed_at: DateTime<Utc>,
}
