//! Periodic inspection of the open position.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::sizer::protective_levels;
use crate::config::MonitorConfig;
use crate::domain::{ClosedPnl, OrderStatus, Position, PriceGrid, RiskParameters};
use crate::exchanges::{Exchange, ExchangeError};

/// How many recent orders/PnL records are searched for a closing trade.
const HISTORY_LIMIT: u32 = 20;

/// Which protective level the mark price is close to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProximityWarning {
    NearStopLoss,
    NearTakeProfit,
}

/// Snapshot of an open position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionStatus {
    pub position: Position,
    pub pnl_pct: Decimal,
    /// Stop/target derived from the entry price and the current parameters.
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    pub warning: Option<ProximityWarning>,
    /// True on the first check that sees this position.
    pub opened: bool,
    /// True when `warning` differs from the previous check.
    pub warning_changed: bool,
}

/// A position that was open on the previous check and is gone now.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    /// Last observed state before closing.
    pub last_seen: Position,
    /// Realized result, when the exchange could report it.
    pub realized: Option<ClosedPnl>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Open(PositionStatus),
    Closed(ClosedPosition),
}

/// Tracks the position of one symbol between checks.
pub struct PositionMonitor {
    exchange: Arc<dyn Exchange>,
    symbol: String,
    proximity_pct: Decimal,
    price_precision: u32,
    last: Option<Position>,
    last_warning: Option<ProximityWarning>,
}

impl PositionMonitor {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        symbol: impl Into<String>,
        config: &MonitorConfig,
        price_precision: u32,
    ) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
            proximity_pct: config.proximity_pct,
            price_precision,
            last: None,
            last_warning: None,
        }
    }

    /// Queries the position once.
    ///
    /// `Ok(None)` means flat now and on the previous check. An error leaves
    /// the tracked state unchanged, so a failed query is never taken for a
    /// closed position.
    pub async fn check_once(
        &mut self,
        params: &RiskParameters,
    ) -> Result<Option<MonitorEvent>, ExchangeError> {
        let current = self.exchange.get_open_position(&self.symbol).await?;

        // A zero-size entry is "flat"; it also has no PnL percentage.
        let current = current.and_then(|p| p.pnl_pct().map(|pct| (p, pct)));

        match (current, self.last.take()) {
            (Some((position, pnl_pct)), previous) => {
                let status = self.status(position, pnl_pct, params, previous.is_none());
                self.last = Some(status.position.clone());
                Ok(Some(MonitorEvent::Open(status)))
            }
            (None, Some(last_seen)) => {
                self.last_warning = None;
                let realized = self.realized_pnl().await;
                info!(
                    symbol = %self.symbol,
                    entry = %last_seen.entry_price,
                    size = %last_seen.size,
                    realized = ?realized.as_ref().map(|r| r.closed_pnl),
                    "position closed"
                );
                Ok(Some(MonitorEvent::Closed(ClosedPosition {
                    last_seen,
                    realized,
                })))
            }
            (None, None) => Ok(None),
        }
    }

    fn status(
        &mut self,
        position: Position,
        pnl_pct: Decimal,
        params: &RiskParameters,
        opened: bool,
    ) -> PositionStatus {
        let levels = protective_levels(
            position.entry_price,
            params.stop_loss_pct,
            params.take_profit_pct,
            PriceGrid::Decimals(self.price_precision),
        );

        let warning = if self.is_near(position.mark_price, levels.stop_loss) {
            Some(ProximityWarning::NearStopLoss)
        } else if self.is_near(position.mark_price, levels.take_profit) {
            Some(ProximityWarning::NearTakeProfit)
        } else {
            None
        };
        let warning_changed = warning != self.last_warning;
        self.last_warning = warning;

        if opened {
            info!(
                symbol = %position.symbol,
                size = %position.size,
                entry = %position.entry_price,
                "position opened"
            );
        }
        if warning_changed && warning.is_some() {
            warn!(
                symbol = %position.symbol,
                mark = %position.mark_price,
                stop_loss = %levels.stop_loss,
                take_profit = %levels.take_profit,
                warning = ?warning,
                "mark price near protective level"
            );
        }
        debug!(symbol = %position.symbol, pnl_pct = %pnl_pct.round_dp(2), "position checked");

        PositionStatus {
            position,
            pnl_pct,
            stop_loss_price: levels.stop_loss,
            take_profit_price: levels.take_profit,
            warning,
            opened,
            warning_changed,
        }
    }

    fn is_near(&self, mark: Decimal, level: Decimal) -> bool {
        if level <= Decimal::ZERO || mark <= Decimal::ZERO {
            return false;
        }
        (mark - level).abs() / level * Decimal::ONE_HUNDRED <= self.proximity_pct
    }

    /// PnL of the latest reduce-only fill, or the latest record if no order
    /// matches. Failures are logged and yield `None`.
    async fn realized_pnl(&self) -> Option<ClosedPnl> {
        let closing_order = match self
            .exchange
            .get_recent_orders(&self.symbol, HISTORY_LIMIT)
            .await
        {
            Ok(orders) => orders
                .into_iter()
                .find(|o| o.reduce_only && o.status == OrderStatus::Filled),
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "failed to fetch closing order");
                None
            }
        };

        let records = match self.exchange.get_closed_pnl(&self.symbol, HISTORY_LIMIT).await {
            Ok(records) => records,
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "failed to fetch realized pnl");
                return None;
            }
        };

        let matched = closing_order
            .as_ref()
            .and_then(|order| records.iter().find(|r| r.order_id == order.id).cloned());

        matched.or_else(|| records.into_iter().next())
    }
}
