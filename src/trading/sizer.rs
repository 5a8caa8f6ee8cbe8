//! Order sizing: turns a requested quantity or notional into a quantity the
//! exchange accepts, and derives stop/target prices.

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::domain::{InstrumentRules, InvalidRulesError, PriceGrid};

/// Sizing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizingError {
    #[error(transparent)]
    InvalidRules(#[from] InvalidRulesError),

    #[error("mark price must be positive, got {0}")]
    NonPositivePrice(Decimal),
}

/// Rounds `requested` onto the lot grid of `rules`.
///
/// The value is clamped to `[min_qty, max_qty]` and then rounded to the
/// nearest multiple of `qty_step`, ties to even. A result pushed outside the
/// bounds by rounding is moved to the nearest in-range multiple, so the
/// output is always a step multiple inside the bounds and
/// `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(requested: Decimal, rules: &InstrumentRules) -> Result<Decimal, SizingError> {
    rules.validate()?;

    let clamped = requested.max(rules.min_qty).min(rules.max_qty);
    let steps = (clamped / rules.qty_step)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
    let rounded = steps * rules.qty_step;

    let compliant = if rounded < rules.min_qty {
        rules.lowest_step_multiple()
    } else if rounded > rules.max_qty {
        rules.highest_step_multiple()
    } else {
        rounded
    };

    Ok(compliant.normalize())
}

/// Converts a USDT notional to contracts at `mark_price`, then normalizes.
pub fn size_by_notional(
    notional: Decimal,
    mark_price: Decimal,
    rules: &InstrumentRules,
) -> Result<Decimal, SizingError> {
    if mark_price <= Decimal::ZERO {
        return Err(SizingError::NonPositivePrice(mark_price));
    }
    normalize(notional / mark_price, rules)
}

/// Stop-loss and take-profit prices for a long entry at `price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectiveLevels {
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

/// `price * (1 - sl/100)` and `price * (1 + tp/100)`, snapped to `grid`.
pub fn protective_levels(
    price: Decimal,
    stop_loss_pct: Decimal,
    take_profit_pct: Decimal,
    grid: PriceGrid,
) -> ProtectiveLevels {
    let stop_loss = price * (Decimal::ONE - stop_loss_pct / Decimal::ONE_HUNDRED);
    let take_profit = price * (Decimal::ONE + take_profit_pct / Decimal::ONE_HUNDRED);

    ProtectiveLevels {
        stop_loss: grid.round(stop_loss),
        take_profit: grid.round(take_profit),
    }
}
