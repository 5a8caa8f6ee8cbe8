//! In-memory exchange for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{
    ClosedPnl, InstrumentRules, Order, OrderSide, OrderStatus, PlacedOrder, Position,
};
use crate::exchanges::{Exchange, ExchangeError, Result};

/// Exchange operations, used to script failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    Connect,
    MarkPrice,
    Rules,
    PlaceOrder,
    SetLeverage,
    SetProtective,
    Position,
    Orders,
    ClosedPnl,
    Balance,
}

/// Scriptable exchange: every call succeeds with the configured value unless
/// a failure was registered for its operation.
pub(crate) struct MockExchange {
    price: Mutex<Decimal>,
    rules: Mutex<InstrumentRules>,
    position: Mutex<Option<Position>>,
    orders: Mutex<Vec<Order>>,
    closed_pnl: Mutex<Vec<ClosedPnl>>,
    balance: Mutex<Decimal>,
    failures: Mutex<HashMap<Op, fn() -> ExchangeError>>,
    delays: Mutex<HashMap<Op, Duration>>,
    calls: Mutex<HashMap<Op, usize>>,
    /// (symbol, side, quantity) of every accepted order.
    pub placed: Mutex<Vec<(String, OrderSide, Decimal)>>,
    /// (stop_loss, take_profit) of every protective level request.
    pub protective: Mutex<Vec<(Decimal, Decimal)>>,
    pub leverage: Mutex<Vec<u32>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            price: Mutex::new(Decimal::ONE_HUNDRED),
            rules: Mutex::new(InstrumentRules::new(
                Decimal::new(1, 2),
                Decimal::new(1_000_000, 0),
                Decimal::new(1, 2),
            )),
            position: Mutex::new(None),
            orders: Mutex::new(Vec::new()),
            closed_pnl: Mutex::new(Vec::new()),
            balance: Mutex::new(Decimal::new(1000, 0)),
            failures: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            placed: Mutex::new(Vec::new()),
            protective: Mutex::new(Vec::new()),
            leverage: Mutex::new(Vec::new()),
        }
    }

    pub fn with_price(self, price: Decimal) -> Self {
        *self.price.lock().unwrap() = price;
        self
    }

    pub fn with_rules(self, rules: InstrumentRules) -> Self {
        *self.rules.lock().unwrap() = rules;
        self
    }

    pub fn with_delay(self, op: Op, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(op, delay);
        self
    }

    pub fn failing(self, op: Op, err: fn() -> ExchangeError) -> Self {
        self.fail(op, err);
        self
    }

    pub fn fail(&self, op: Op, err: fn() -> ExchangeError) {
        self.failures.lock().unwrap().insert(op, err);
    }

    pub fn recover(&self, op: Op) {
        self.failures.lock().unwrap().remove(&op);
    }

    pub fn set_position(&self, position: Option<Position>) {
        *self.position.lock().unwrap() = position;
    }

    pub fn set_orders(&self, orders: Vec<Order>) {
        *self.orders.lock().unwrap() = orders;
    }

    pub fn set_closed_pnl(&self, records: Vec<ClosedPnl>) {
        *self.closed_pnl.lock().unwrap() = records;
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    async fn enter(&self, op: Op) -> Result<()> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;

        let delay = self.delays.lock().unwrap().get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.failures.lock().unwrap().get(&op) {
            Some(err) => Err(err()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn connect(&self) -> Result<()> {
        self.enter(Op::Connect).await
    }

    async fn get_mark_price(&self, _symbol: &str) -> Result<Decimal> {
        self.enter(Op::MarkPrice).await?;
        Ok(*self.price.lock().unwrap())
    }

    async fn get_instrument_rules(&self, _symbol: &str) -> Result<InstrumentRules> {
        self.enter(Op::Rules).await?;
        Ok(*self.rules.lock().unwrap())
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<PlacedOrder> {
        self.enter(Op::PlaceOrder).await?;
        let mut placed = self.placed.lock().unwrap();
        placed.push((symbol.to_string(), side, quantity));
        Ok(PlacedOrder {
            order_id: format!("order-{}", placed.len()),
            status: OrderStatus::New,
        })
    }

    async fn set_leverage(&self, _symbol: &str, leverage: u32) -> Result<()> {
        self.enter(Op::SetLeverage).await?;
        self.leverage.lock().unwrap().push(leverage);
        Ok(())
    }

    async fn set_protective_levels(
        &self,
        _symbol: &str,
        stop_loss: Decimal,
        take_profit: Decimal,
    ) -> Result<()> {
        self.enter(Op::SetProtective).await?;
        self.protective.lock().unwrap().push((stop_loss, take_profit));
        Ok(())
    }

    async fn get_open_position(&self, _symbol: &str) -> Result<Option<Position>> {
        self.enter(Op::Position).await?;
        Ok(self.position.lock().unwrap().clone())
    }

    async fn get_recent_orders(&self, _symbol: &str, limit: u32) -> Result<Vec<Order>> {
        self.enter(Op::Orders).await?;
        let orders = self.orders.lock().unwrap();
        Ok(orders.iter().take(limit as usize).cloned().collect())
    }

    async fn get_closed_pnl(&self, _symbol: &str, limit: u32) -> Result<Vec<ClosedPnl>> {
        self.enter(Op::ClosedPnl).await?;
        let records = self.closed_pnl.lock().unwrap();
        Ok(records.iter().take(limit as usize).cloned().collect())
    }

    async fn get_wallet_balance(&self, _asset: &str) -> Result<Decimal> {
        self.enter(Op::Balance).await?;
        Ok(*self.balance.lock().unwrap())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
