//! Operator-adjustable risk parameters and their field parsers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Highest leverage the operator may configure.
pub const MAX_LEVERAGE: u32 = 100;

/// Why a value was refused for a risk field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("'{0}' is not a whole number")]
    NotAnInteger(String),
    #[error("value must be greater than 0")]
    NotPositive,
    #[error("value must be at least {0} USDT")]
    BelowMinimum(Decimal),
    #[error("percentage must be between 0 and 100 (exclusive), got {0}")]
    PercentOutOfRange(Decimal),
    #[error("leverage must be between 1 and {max}, got {value}")]
    LeverageOutOfRange { value: i64, max: u32 },
}

/// One editable field of [`RiskParameters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskField {
    Quantity,
    StopLoss,
    TakeProfit,
    Leverage,
}

impl RiskField {
    pub const ALL: [RiskField; 4] = [
        RiskField::Quantity,
        RiskField::StopLoss,
        RiskField::TakeProfit,
        RiskField::Leverage,
    ];

    /// Human-readable name.
    pub fn label(&self) -> &'static str {
        match self {
            RiskField::Quantity => "Quantity",
            RiskField::StopLoss => "Stop Loss",
            RiskField::TakeProfit => "Take Profit",
            RiskField::Leverage => "Leverage",
        }
    }

    /// Describes the accepted domain, shown when prompting for a value.
    pub fn constraint(&self, min_notional: Decimal) -> String {
        match self {
            RiskField::Quantity => format!("order size in USDT, at least {}", min_notional),
            RiskField::StopLoss | RiskField::TakeProfit => {
                "percentage between 0 and 100 (exclusive)".to_string()
            }
            RiskField::Leverage => format!("whole number from 1 to {}", MAX_LEVERAGE),
        }
    }
}

impl fmt::Display for RiskField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The persisted trading configuration.
///
/// `quantity` is the order notional in USDT; it is converted to contracts at
/// the mark price immediately before each order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskParameters {
    pub quantity: Decimal,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub leverage: u32,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            quantity: Decimal::new(10, 0),
            stop_loss_pct: Decimal::new(2, 0),
            take_profit_pct: Decimal::new(4, 0),
            leverage: 1,
        }
    }
}

impl RiskParameters {
    /// Checks every field against its domain.
    pub fn validate(&self, min_notional: Decimal) -> Result<(), ValidationError> {
        check_quantity(self.quantity, min_notional)?;
        check_percent(self.stop_loss_pct)?;
        check_percent(self.take_profit_pct)?;
        check_leverage(i64::from(self.leverage))?;
        Ok(())
    }

    /// Parses `text` for `field` and returns a copy with that field replaced.
    ///
    /// `self` is never modified; the caller decides when the new value takes
    /// effect.
    pub fn with_field(
        &self,
        field: RiskField,
        text: &str,
        min_notional: Decimal,
    ) -> Result<RiskParameters, ValidationError> {
        let mut updated = *self;
        match field {
            RiskField::Quantity => updated.quantity = parse_quantity(text, min_notional)?,
            RiskField::StopLoss => updated.stop_loss_pct = parse_percent(text)?,
            RiskField::TakeProfit => updated.take_profit_pct = parse_percent(text)?,
            RiskField::Leverage => updated.leverage = parse_leverage(text)?,
        }
        Ok(updated)
    }

    /// Current value of `field`, formatted for display.
    pub fn display_value(&self, field: RiskField) -> String {
        match field {
            RiskField::Quantity => format!("{} USDT", self.quantity.normalize()),
            RiskField::StopLoss => format!("{}%", self.stop_loss_pct.normalize()),
            RiskField::TakeProfit => format!("{}%", self.take_profit_pct.normalize()),
            RiskField::Leverage => format!("{}x", self.leverage),
        }
    }
}

/// Parses an order notional in USDT.
pub fn parse_quantity(text: &str, min_notional: Decimal) -> Result<Decimal, ValidationError> {
    let value = parse_decimal(text.trim().trim_end_matches("USDT").trim())?;
    check_quantity(value, min_notional)?;
    Ok(value)
}

/// Parses a stop-loss or take-profit percentage; a trailing `%` is allowed.
pub fn parse_percent(text: &str) -> Result<Decimal, ValidationError> {
    let value = parse_decimal(text.trim().trim_end_matches('%').trim())?;
    check_percent(value)?;
    Ok(value)
}

/// Parses a leverage multiplier; a trailing `x` is allowed.
pub fn parse_leverage(text: &str) -> Result<u32, ValidationError> {
    let cleaned = text.trim().trim_end_matches(['x', 'X']).trim();
    let value = match cleaned.parse::<i64>() {
        Ok(v) => v,
        Err(_) => {
            // Distinguish "2.5" from "abc" so the re-prompt names the right constraint.
            return Err(match Decimal::from_str(cleaned) {
                Ok(_) => ValidationError::NotAnInteger(text.trim().to_string()),
                Err(_) => ValidationError::NotANumber(text.trim().to_string()),
            });
        }
    };
    check_leverage(value)?;
    // check_leverage bounds the value to 1..=MAX_LEVERAGE
    Ok(value as u32)
}

fn parse_decimal(text: &str) -> Result<Decimal, ValidationError> {
    Decimal::from_str(text).map_err(|_| ValidationError::NotANumber(text.to_string()))
}

fn check_quantity(value: Decimal, min_notional: Decimal) -> Result<(), ValidationError> {
    if value <= Decimal::ZERO {
        return Err(ValidationError::NotPositive);
    }
    if value < min_notional {
        return Err(ValidationError::BelowMinimum(min_notional));
    }
    Ok(())
}

fn check_percent(value: Decimal) -> Result<(), ValidationError> {
    if value <= Decimal::ZERO || value >= Decimal::ONE_HUNDRED {
        return Err(ValidationError::PercentOutOfRange(value));
    }
    Ok(())
}

fn check_leverage(value: i64) -> Result<(), ValidationError> {
    if value < 1 || value > i64::from(MAX_LEVERAGE) {
        return Err(ValidationError::LeverageOutOfRange {
            value,
            max: MAX_LEVERAGE,
        });
    }
    Ok(())
}
