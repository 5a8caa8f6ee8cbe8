//! Long entry execution against the exchange.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::sizer::{SizingError, protective_levels, size_by_notional};
use crate::config::TradingConfig;
use crate::domain::{
    InstrumentRules, OrderSide, RiskParameters, TradeErrorKind, TradeFill, TradeResult,
};
use crate::exchanges::{self, Exchange, ExchangeError};

/// Places one market long per call and attaches leverage and stop/target
/// levels to the resulting position.
///
/// Calls for the same symbol never overlap: while one is in flight, others
/// return [`TradeErrorKind::Busy`] without touching the exchange.
pub struct TradeExecutor {
    exchange: Arc<dyn Exchange>,
    symbol: String,
    call_timeout: Duration,
    price_precision: u32,
    rules_cache_ttl: Duration,
    rules_cache: Mutex<Option<(Instant, InstrumentRules)>>,
    in_flight: Mutex<HashSet<String>>,
}

impl TradeExecutor {
    pub fn new(exchange: Arc<dyn Exchange>, config: &TradingConfig) -> Self {
        Self {
            exchange,
            symbol: config.symbol.clone(),
            call_timeout: config.post_fill_timeout(),
            price_precision: config.price_precision,
            rules_cache_ttl: config.rules_cache_ttl,
            rules_cache: Mutex::new(None),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Opens a long position sized by `params.quantity` USDT.
    ///
    /// Failures before the order is accepted abort the attempt. Failures
    /// after it (leverage, stop/target) only add warnings to the fill: the
    /// position exists either way. Nothing is retried.
    pub async fn execute_long_entry(&self, params: &RiskParameters) -> TradeResult {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, &self.symbol) else {
            warn!(symbol = %self.symbol, "trade already in flight, rejecting");
            return TradeResult::failed(
                &self.symbol,
                TradeErrorKind::Busy,
                "another trade for this symbol is still running",
            );
        };

        let started = Instant::now();
        info!(
            symbol = %self.symbol,
            notional = %params.quantity,
            stop_loss_pct = %params.stop_loss_pct,
            take_profit_pct = %params.take_profit_pct,
            leverage = params.leverage,
            "executing long entry"
        );

        let price = match self.bounded(self.exchange.get_mark_price(&self.symbol)).await {
            Ok(price) => price,
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "mark price unavailable, aborting");
                return self.exchange_failure(TradeErrorKind::PriceUnavailable, &e);
            }
        };

        let mut warnings = Vec::new();
        let rules = self.instrument_rules(&mut warnings).await;

        let quantity = match size_by_notional(params.quantity, price, &rules) {
            Ok(qty) => qty,
            Err(SizingError::NonPositivePrice(p)) => {
                return TradeResult::failed(
                    &self.symbol,
                    TradeErrorKind::PriceUnavailable,
                    format!("unusable mark price {}", p),
                );
            }
            Err(e) => {
                return TradeResult::failed(
                    &self.symbol,
                    TradeErrorKind::OrderRejected,
                    format!("cannot size order: {}", e),
                );
            }
        };

        let levels = protective_levels(
            price,
            params.stop_loss_pct,
            params.take_profit_pct,
            rules.price_grid(self.price_precision),
        );

        let placed = match self
            .exchange
            .place_market_order(&self.symbol, OrderSide::Buy, quantity)
            .await
        {
            Ok(placed) => placed,
            Err(e) if e.is_ambiguous() => {
                error!(
                    symbol = %self.symbol,
                    qty = %quantity,
                    error = %e,
                    "order submission outcome unknown, check the position before retrying"
                );
                return self.exchange_failure(TradeErrorKind::SubmissionUncertain, &e);
            }
            Err(e) => {
                warn!(symbol = %self.symbol, qty = %quantity, error = %e, "order rejected");
                return self.exchange_failure(TradeErrorKind::OrderRejected, &e);
            }
        };

        if let Err(e) = self
            .bounded(self.exchange.set_leverage(&self.symbol, params.leverage))
            .await
        {
            warn!(symbol = %self.symbol, leverage = params.leverage, error = %e, "failed to set leverage after fill");
            warnings.push(format!("leverage {}x not applied: {}", params.leverage, e));
        }

        if let Err(e) = self
            .bounded(self.exchange.set_protective_levels(
                &self.symbol,
                levels.stop_loss,
                levels.take_profit,
            ))
            .await
        {
            warn!(
                symbol = %self.symbol,
                stop_loss = %levels.stop_loss,
                take_profit = %levels.take_profit,
                error = %e,
                "failed to attach stop-loss/take-profit, position is unprotected"
            );
            warnings.push(format!("stop-loss/take-profit not attached: {}", e));
        }

        info!(
            symbol = %self.symbol,
            order_id = %placed.order_id,
            price = %price,
            qty = %quantity,
            stop_loss = %levels.stop_loss,
            take_profit = %levels.take_profit,
            degraded = !warnings.is_empty(),
            elapsed = ?started.elapsed(),
            "long entry filled"
        );

        TradeResult::Filled(TradeFill {
            symbol: self.symbol.clone(),
            order_id: placed.order_id,
            entry_price: price,
            executed_quantity: quantity,
            stop_loss_price: levels.stop_loss,
            take_profit_price: levels.take_profit,
            leverage: params.leverage,
            warnings,
        })
    }

    fn exchange_failure(&self, kind: TradeErrorKind, err: &ExchangeError) -> TradeResult {
        TradeResult::failed(&self.symbol, kind, err.to_string())
            .with_credentials_rejected(matches!(err, ExchangeError::Authentication(_)))
    }

    /// Lot size rules, from cache, the exchange, or the fallback.
    async fn instrument_rules(&self, warnings: &mut Vec<String>) -> InstrumentRules {
        if !self.rules_cache_ttl.is_zero() {
            let cached = *self
                .rules_cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some((fetched_at, rules)) = cached {
                if fetched_at.elapsed() < self.rules_cache_ttl {
                    return rules;
                }
            }
        }

        let reason = match self
            .bounded(self.exchange.get_instrument_rules(&self.symbol))
            .await
        {
            Ok(rules) => match rules.validate() {
                Ok(()) => {
                    *self
                        .rules_cache
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some((Instant::now(), rules));
                    return rules;
                }
                Err(e) => format!("exchange sent unusable lot rules: {}", e),
            },
            Err(e) => format!("lot rules unavailable: {}", e),
        };

        let fallback = InstrumentRules::fallback();
        warn!(
            symbol = %self.symbol,
            reason = %reason,
            min_qty = %fallback.min_qty,
            max_qty = %fallback.max_qty,
            qty_step = %fallback.qty_step,
            "using fallback lot rules"
        );
        warnings.push(format!("{}; used fallback lot rules", reason));
        fallback
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = exchanges::Result<T>>,
    ) -> exchanges::Result<T> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Timeout(format!(
                "no answer within {:?}",
                self.call_timeout
            ))),
        }
    }
}

/// Marks a symbol as trading until dropped.
struct InFlightGuard<'a> {
    symbols: &'a Mutex<HashSet<String>>,
    symbol: &'a str,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(symbols: &'a Mutex<HashSet<String>>, symbol: &'a str) -> Option<Self> {
        let mut set = symbols.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(symbol.to_string()) {
            return None;
        }
        Some(Self { symbols, symbol })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.symbols
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::mock::{MockExchange, Op};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn config() -> TradingConfig {
        TradingConfig {
            post_fill_timeout: Duration::from_millis(200),
            ..TradingConfig::default()
        }
    }

    fn params() -> RiskParameters {
        RiskParameters {
            quantity: d("10"),
            stop_loss_pct: d("2"),
            take_profit_pct: d("4"),
            leverage: 3,
        }
    }

    fn executor(exchange: &Arc<MockExchange>) -> TradeExecutor {
        TradeExecutor::new(exchange.clone(), &config())
    }

    fn fill(result: TradeResult) -> TradeFill {
        match result {
            TradeResult::Filled(fill) => fill,
            TradeResult::Failed(f) => panic!("expected fill, got {:?}", f),
        }
    }

    #[tokio::test]
    async fn test_successful_entry() {
        let exchange = Arc::new(MockExchange::new().with_price(d("100")));
        let result = executor(&exchange).execute_long_entry(&params()).await;

        let fill = fill(result);
        assert_eq!(fill.entry_price, d("100"));
        assert_eq!(fill.executed_quantity, d("0.1"));
        assert_eq!(fill.stop_loss_price, d("98"));
        assert_eq!(fill.take_profit_price, d("104"));
        assert!(!fill.is_degraded());

        assert_eq!(
            exchange.placed.lock().unwrap()[0],
            ("MNTUSDT".to_string(), OrderSide::Buy, d("0.1"))
        );
        assert_eq!(*exchange.leverage.lock().unwrap(), vec![3]);
        assert_eq!(*exchange.protective.lock().unwrap(), vec![(d("98"), d("104"))]);
    }

    #[tokio::test]
    async fn test_price_failure_aborts() {
        let exchange = Arc::new(
            MockExchange::new()
                .failing(Op::MarkPrice, || ExchangeError::Connection("down".into())),
        );
        let result = executor(&exchange).execute_long_entry(&params()).await;

        assert_eq!(result.error_kind(), Some(TradeErrorKind::PriceUnavailable));
        assert_eq!(exchange.calls(Op::PlaceOrder), 0);
    }

    #[tokio::test]
    async fn test_price_timeout_aborts() {
        let exchange = Arc::new(
            MockExchange::new().with_delay(Op::MarkPrice, Duration::from_secs(5)),
        );
        let result = executor(&exchange).execute_long_entry(&params()).await;

        assert_eq!(result.error_kind(), Some(TradeErrorKind::PriceUnavailable));
        assert_eq!(exchange.calls(Op::PlaceOrder), 0);
    }

    #[tokio::test]
    async fn test_rules_failure_uses_fallback() {
        let exchange = Arc::new(
            MockExchange::new()
                .with_price(d("0.8"))
                .failing(Op::Rules, || ExchangeError::Timeout("slow".into())),
        );
        let fill = fill(executor(&exchange).execute_long_entry(&params()).await);

        // 10 / 0.8 = 12.5, step 1 ties to even
        assert_eq!(fill.executed_quantity, d("12"));
        assert!(fill.is_degraded());
        assert!(fill.warnings[0].contains("fallback lot rules"));
    }

    #[tokio::test]
    async fn test_invalid_rules_use_fallback() {
        let exchange = Arc::new(
            MockExchange::new()
                .with_price(d("100"))
                .with_rules(InstrumentRules::new(d("1"), d("10"), Decimal::ZERO)),
        );
        let fill = fill(executor(&exchange).execute_long_entry(&params()).await);

        // 0.1 contracts clamped up to the fallback minimum
        assert_eq!(fill.executed_quantity, d("1"));
        assert!(fill.is_degraded());
    }

    #[tokio::test]
    async fn test_rejected_order_skips_follow_ups() {
        let exchange = Arc::new(MockExchange::new().failing(Op::PlaceOrder, || {
            ExchangeError::Api {
                code: 10001,
                message: "qty invalid".into(),
            }
        }));
        let result = executor(&exchange).execute_long_entry(&params()).await;

        assert_eq!(result.error_kind(), Some(TradeErrorKind::OrderRejected));
        assert_eq!(exchange.calls(Op::SetLeverage), 0);
        assert_eq!(exchange.calls(Op::SetProtective), 0);
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_flagged() {
        let exchange = Arc::new(MockExchange::new().failing(Op::PlaceOrder, || {
            ExchangeError::Authentication("invalid api key".into())
        }));
        let result = executor(&exchange).execute_long_entry(&params()).await;

        match result {
            TradeResult::Failed(f) => {
                assert_eq!(f.kind, TradeErrorKind::OrderRejected);
                assert!(f.credentials_rejected);
            }
            TradeResult::Filled(fill) => panic!("expected failure, got {:?}", fill),
        }
    }

    #[tokio::test]
    async fn test_other_rejections_are_not_credential_failures() {
        let exchange = Arc::new(
            MockExchange::new().failing(Op::PlaceOrder, || ExchangeError::InsufficientFunds),
        );
        let result = executor(&exchange).execute_long_entry(&params()).await;

        assert!(matches!(
            result,
            TradeResult::Failed(f) if !f.credentials_rejected
        ));
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_rejection() {
        let exchange = Arc::new(
            MockExchange::new().failing(Op::PlaceOrder, || ExchangeError::InsufficientFunds),
        );
        let result = executor(&exchange).execute_long_entry(&params()).await;

        assert_eq!(result.error_kind(), Some(TradeErrorKind::OrderRejected));
    }

    #[tokio::test]
    async fn test_ambiguous_submission_is_uncertain() {
        let exchange = Arc::new(
            MockExchange::new()
                .failing(Op::PlaceOrder, || ExchangeError::Timeout("read timed out".into())),
        );
        let result = executor(&exchange).execute_long_entry(&params()).await;

        assert_eq!(result.error_kind(), Some(TradeErrorKind::SubmissionUncertain));
        assert_eq!(exchange.calls(Op::SetLeverage), 0);
        assert_eq!(exchange.calls(Op::SetProtective), 0);
    }

    #[tokio::test]
    async fn test_stop_failure_after_fill_is_still_success() {
        let exchange = Arc::new(MockExchange::new().failing(Op::SetProtective, || {
            ExchangeError::Api {
                code: 10001,
                message: "tpsl rejected".into(),
            }
        }));
        let result = executor(&exchange).execute_long_entry(&params()).await;

        assert!(result.is_success());
        let fill = fill(result);
        assert_eq!(fill.warnings.len(), 1);
        assert!(fill.warnings[0].contains("stop-loss/take-profit"));
    }

    #[tokio::test]
    async fn test_leverage_failure_still_attaches_stops() {
        let exchange = Arc::new(
            MockExchange::new()
                .failing(Op::SetLeverage, || ExchangeError::Connection("reset".into())),
        );
        let fill = fill(executor(&exchange).execute_long_entry(&params()).await);

        assert!(fill.is_degraded());
        assert_eq!(exchange.calls(Op::SetProtective), 1);
    }

    #[tokio::test]
    async fn test_hanging_follow_up_is_abandoned() {
        let exchange = Arc::new(
            MockExchange::new().with_delay(Op::SetProtective, Duration::from_secs(5)),
        );
        let fill = fill(executor(&exchange).execute_long_entry(&params()).await);

        assert!(fill.is_degraded());
        assert_eq!(exchange.calls(Op::PlaceOrder), 1);
    }

    #[tokio::test]
    async fn test_concurrent_entries_submit_once() {
        let exchange = Arc::new(
            MockExchange::new().with_delay(Op::MarkPrice, Duration::from_millis(50)),
        );
        let executor = executor(&exchange);
        let p = params();

        let (a, b) = tokio::join!(
            executor.execute_long_entry(&p),
            executor.execute_long_entry(&p)
        );

        assert_eq!(exchange.calls(Op::PlaceOrder), 1);
        let kinds = [a.error_kind(), b.error_kind()];
        assert!(kinds.contains(&None));
        assert!(kinds.contains(&Some(TradeErrorKind::Busy)));
    }

    #[tokio::test]
    async fn test_lock_released_after_failure() {
        let exchange = Arc::new(
            MockExchange::new()
                .failing(Op::MarkPrice, || ExchangeError::Connection("down".into())),
        );
        let executor = executor(&exchange);

        executor.execute_long_entry(&params()).await;
        exchange.recover(Op::MarkPrice);
        let result = executor.execute_long_entry(&params()).await;

        assert!(result.is_success());
        assert_eq!(exchange.calls(Op::PlaceOrder), 1);
    }

    #[tokio::test]
    async fn test_rules_cache_reused_within_ttl() {
        let exchange = Arc::new(MockExchange::new());
        let config = TradingConfig {
            rules_cache_ttl: Duration::from_secs(60),
            ..config()
        };
        let executor = TradeExecutor::new(exchange.clone(), &config);

        executor.execute_long_entry(&params()).await;
        executor.execute_long_entry(&params()).await;

        assert_eq!(exchange.calls(Op::Rules), 1);
        assert_eq!(exchange.calls(Op::PlaceOrder), 2);
    }

    #[tokio::test]
    async fn test_rules_refetched_without_cache() {
        let exchange = Arc::new(MockExchange::new());
        let executor = executor(&exchange);

        executor.execute_long_entry(&params()).await;
        executor.execute_long_entry(&params()).await;

        assert_eq!(exchange.calls(Op::Rules), 2);
    }
}
