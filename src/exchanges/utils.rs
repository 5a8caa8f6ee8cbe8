//! Common parsing helpers for exchange responses.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{OrderSide, OrderStatus};
use crate::exchanges::{ExchangeError, Result};

/// Parses a required decimal field sent as a string.
pub fn parse_decimal(field: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value.trim())
        .map_err(|_| ExchangeError::Parse(format!("{}: invalid decimal '{}'", field, value)))
}

/// Parses an optional decimal field; empty strings become `None`.
pub fn parse_optional_decimal(value: &str) -> Option<Decimal> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Decimal::from_str(value).ok()
}

/// Parses order side from string.
pub fn parse_order_side(side: &str) -> OrderSide {
    match side.to_uppercase().as_str() {
        "BUY" => OrderSide::Buy,
        _ => OrderSide::Sell,
    }
}

/// Maps exchange order states to OrderStatus.
pub fn parse_order_status(state: &str) -> OrderStatus {
    match state {
        "Created" | "New" | "Untriggered" => OrderStatus::New,
        "PartiallyFilled" => OrderStatus::PartiallyFilled,
        "Filled" => OrderStatus::Filled,
        "Cancelled" | "PartiallyFilledCanceled" | "Deactivated" => OrderStatus::Cancelled,
        "Rejected" => OrderStatus::Rejected,
        _ => OrderStatus::Unknown,
    }
}

/// Converts a millisecond timestamp sent as a string.
pub fn parse_millis(value: &str) -> DateTime<Utc> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_default()
}
