//! Domain models for listing-triggered trading.

mod announcement;
mod instrument;
mod order;
mod risk;
mod trade;

pub use announcement::Announcement;
pub use instrument::{InstrumentRules, InvalidRulesError, PriceGrid};
pub use order::{ClosedPnl, Order, OrderSide, OrderStatus, PlacedOrder, Position};
pub use risk::{RiskField, RiskParameters, ValidationError};
pub use trade::{TradeErrorKind, TradeFailure, TradeFill, TradeResult};
