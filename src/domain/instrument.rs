//! Lot size rules for a tradable instrument.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lot size rules that make the rules unusable for sizing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRulesError {
    #[error("quantity step must be positive, got {0}")]
    NonPositiveStep(Decimal),
    #[error("minimum quantity must be positive, got {0}")]
    NonPositiveMinimum(Decimal),
    #[error("minimum quantity {min} exceeds maximum {max}")]
    MinAboveMax { min: Decimal, max: Decimal },
    #[error("no multiple of step {step} lies within [{min}, {max}]")]
    NoValidQuantity {
        min: Decimal,
        max: Decimal,
        step: Decimal,
    },
}

/// Exchange-imposed quantity limits for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRules {
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub qty_step: Decimal,
    /// Minimum price increment, when the exchange reports one.
    pub tick_size: Option<Decimal>,
}

impl InstrumentRules {
    pub fn new(min_qty: Decimal, max_qty: Decimal, qty_step: Decimal) -> Self {
        Self {
            min_qty,
            max_qty,
            qty_step,
            tick_size: None,
        }
    }

    /// Conservative rules used when the exchange cannot be asked.
    pub fn fallback() -> Self {
        Self::new(Decimal::ONE, Decimal::new(10_000, 0), Decimal::ONE)
    }

    /// Checks that at least one quantity satisfies the rules.
    pub fn validate(&self) -> Result<(), InvalidRulesError> {
        if self.qty_step <= Decimal::ZERO {
            return Err(InvalidRulesError::NonPositiveStep(self.qty_step));
        }
        if self.min_qty <= Decimal::ZERO {
            return Err(InvalidRulesError::NonPositiveMinimum(self.min_qty));
        }
        if self.min_qty > self.max_qty {
            return Err(InvalidRulesError::MinAboveMax {
                min: self.min_qty,
                max: self.max_qty,
            });
        }
        if self.lowest_step_multiple() > self.max_qty {
            return Err(InvalidRulesError::NoValidQuantity {
                min: self.min_qty,
                max: self.max_qty,
                step: self.qty_step,
            });
        }
        Ok(())
    }

    /// Smallest multiple of the step that is not below `min_qty`.
    pub(crate) fn lowest_step_multiple(&self) -> Decimal {
        (self.min_qty / self.qty_step).ceil() * self.qty_step
    }

    /// Largest multiple of the step that is not above `max_qty`.
    pub(crate) fn highest_step_multiple(&self) -> Decimal {
        (self.max_qty / self.qty_step).floor() * self.qty_step
    }

    /// Price grid for orders on this symbol: the tick size when known,
    /// else `default_precision` decimal places.
    pub fn price_grid(&self, default_precision: u32) -> PriceGrid {
        match self.tick_size.filter(|t| *t > Decimal::ZERO) {
            Some(tick) => PriceGrid::Tick(tick),
            None => PriceGrid::Decimals(default_precision),
        }
    }
}

/// Grid that order prices are snapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceGrid {
    /// Multiples of the exchange tick size.
    Tick(Decimal),
    /// A fixed number of decimal places.
    Decimals(u32),
}

impl PriceGrid {
    /// Nearest point of the grid to `price`, ties to even.
    pub fn round(&self, price: Decimal) -> Decimal {
        match *self {
            PriceGrid::Tick(tick) => ((price / tick).round() * tick).normalize(),
            PriceGrid::Decimals(dp) => price.round_dp(dp),
        }
    }
}
