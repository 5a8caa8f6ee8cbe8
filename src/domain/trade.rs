//! Outcome of a single trade attempt.

use rust_decimal::Decimal;
use std::fmt;

/// Why a trade attempt did not open a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeErrorKind {
    /// The mark price could not be fetched; nothing was submitted.
    PriceUnavailable,
    /// The exchange declined the order; no position was opened.
    OrderRejected,
    /// The order request was sent but no answer arrived. A position may exist.
    SubmissionUncertain,
    /// Another trade for the same symbol was already in flight.
    Busy,
}

impl fmt::Display for TradeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeErrorKind::PriceUnavailable => write!(f, "price unavailable"),
            TradeErrorKind::OrderRejected => write!(f, "order rejected"),
            TradeErrorKind::SubmissionUncertain => write!(f, "submission uncertain"),
            TradeErrorKind::Busy => write!(f, "trade already in progress"),
        }
    }
}

/// A filled long entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeFill {
    pub symbol: String,
    pub order_id: String,
    pub entry_price: Decimal,
    pub executed_quantity: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    pub leverage: u32,
    /// Degradations that did not undo the fill (fallback lot rules,
    /// leverage or stop attachment failures).
    pub warnings: Vec<String>,
}

impl TradeFill {
    /// True when the position may be running without its stop/target levels
    /// or leverage.
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A trade attempt that did not produce a fill.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeFailure {
    pub symbol: String,
    pub kind: TradeErrorKind,
    pub message: String,
    /// The exchange refused the API credentials.
    pub credentials_rejected: bool,
}

/// Result of one `execute_long_entry` call.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeResult {
    Filled(TradeFill),
    Failed(TradeFailure),
}

impl TradeResult {
    pub fn failed(symbol: &str, kind: TradeErrorKind, message: impl Into<String>) -> Self {
        TradeResult::Failed(TradeFailure {
            symbol: symbol.to_string(),
            kind,
            message: message.into(),
            credentials_rejected: false,
        })
    }

    /// Marks a failure as caused by rejected credentials. No-op on a fill.
    pub fn with_credentials_rejected(mut self, rejected: bool) -> Self {
        if let TradeResult::Failed(f) = &mut self {
            f.credentials_rejected = rejected;
        }
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TradeResult::Filled(_))
    }

    pub fn error_kind(&self) -> Option<TradeErrorKind> {
        match self {
            TradeResult::Filled(_) => None,
            TradeResult::Failed(f) => Some(f.kind),
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            TradeResult::Filled(f) => &f.symbol,
            TradeResult::Failed(f) => &f.symbol,
        }
    }
}
