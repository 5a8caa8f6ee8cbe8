use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::ExchangeConfig;
use crate::domain::{ClosedPnl, InstrumentRules, Order, OrderSide, PlacedOrder, Position};
use crate::exchanges::bybit::client::{Client, ClientError};
use crate::exchanges::utils::{
    parse_decimal, parse_millis, parse_optional_decimal, parse_order_side, parse_order_status,
};
use crate::exchanges::{Exchange, ExchangeError, Result};

const EXCHANGE_NAME: &str = "bybit";

/// Maximum acceptable clock drift between local and server time.
const MAX_CLOCK_DRIFT: Duration = Duration::from_secs(5);

/// Unified trading account type for wallet queries.
const ACCOUNT_TYPE: &str = "UNIFIED";

/// One-way position mode.
const POSITION_IDX: i32 = 0;

// retCodes that need special handling.
const CODE_INVALID_API_KEY: i64 = 10003;
const CODE_INVALID_SIGNATURE: i64 = 10004;
const CODE_PERMISSION_DENIED: i64 = 10005;
const CODE_TOO_MANY_VISITS: i64 = 10006;
const CODE_IP_RATE_LIMIT: i64 = 10018;
const CODE_API_KEY_EXPIRED: i64 = 33004;
const CODE_INSUFFICIENT_BALANCE: i64 = 110007;
const CODE_LEVERAGE_NOT_MODIFIED: i64 = 110043;
const CODE_TPSL_NOT_MODIFIED: i64 = 34040;

// Bare HTTP statuses surface as codes when the body has no envelope.
const HTTP_TOO_MANY_REQUESTS: i64 = 429;
const HTTP_SERVER_ERRORS_START: i64 = 500;
const HTTP_SERVER_ERRORS_END: i64 = 599;

/// Bybit linear derivatives exchange.
pub struct BybitExchange {
    client: Client,
    category: String,
}

impl BybitExchange {
    /// Creates a new BybitExchange from the exchange config.
    pub fn from_config(config: &ExchangeConfig) -> Result<Self> {
        let client = Client::from_config(config)
            .map_err(|e| ExchangeError::Connection(format!("create http client: {}", e)))?;

        Ok(Self::new(client, config.category.clone()))
    }

    pub fn new(client: Client, category: String) -> Self {
        Self { client, category }
    }

    /// True when orders go to the testnet.
    pub fn is_testnet(&self) -> bool {
        self.client.is_testnet()
    }

    fn category_params(&self, symbol: &str) -> Vec<(&'static str, String)> {
        vec![
            ("category", self.category.clone()),
            ("symbol", symbol.to_string()),
        ]
    }
}

#[async_trait]
impl Exchange for BybitExchange {
    async fn connect(&self) -> Result<()> {
        let server_time = self
            .client
            .get_server_time()
            .await
            .map_err(|e| map_client_error(e, "connect"))?;

        let local_time = chrono::Utc::now();
        let drift = (local_time - server_time).abs();

        info!(
            server_time = %server_time,
            clock_drift = ?drift,
            testnet = self.is_testnet(),
            "connected to bybit"
        );

        if drift.num_milliseconds() > MAX_CLOCK_DRIFT.as_millis() as i64 {
            warn!(drift = ?drift, "significant clock drift detected, signed requests may fail");
        }

        Ok(())
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Decimal> {
        let resp: ListResult<TickerInfo> = self
            .client
            .get("/v5/market/tickers", &self.category_params(symbol), false)
            .await
            .map_err(|e| map_client_error(e, symbol))?;

        let ticker = resp
            .list
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::NotFound(format!("ticker for {}", symbol)))?;

        let price = parse_optional_decimal(&ticker.mark_price)
            .filter(|p| *p > Decimal::ZERO)
            .map(Ok)
            .unwrap_or_else(|| parse_decimal("lastPrice", &ticker.last_price))?;

        if price <= Decimal::ZERO {
            return Err(ExchangeError::Parse(format!("non-positive price for {}", symbol)));
        }

        debug!(symbol = %symbol, price = %price, "fetched mark price");
        Ok(price)
    }

    async fn get_instrument_rules(&self, symbol: &str) -> Result<InstrumentRules> {
        let resp: ListResult<InstrumentInfo> = self
            .client
            .get("/v5/market/instruments-info", &self.category_params(symbol), false)
            .await
            .map_err(|e| map_client_error(e, symbol))?;

        let info = resp
            .list
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::NotFound(format!("instrument {}", symbol)))?;

        let lot = &info.lot_size_filter;
        Ok(InstrumentRules {
            min_qty: parse_decimal("minOrderQty", &lot.min_order_qty)?,
            max_qty: parse_decimal("maxOrderQty", &lot.max_order_qty)?,
            qty_step: parse_decimal("qtyStep", &lot.qty_step)?,
            tick_size: info
                .price_filter
                .as_ref()
                .and_then(|p| parse_optional_decimal(&p.tick_size)),
        })
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<PlacedOrder> {
        let body = json!({
            "category": self.category,
            "symbol": symbol,
            "side": side.as_str(),
            "orderType": "Market",
            "qty": quantity.normalize().to_string(),
            "positionIdx": POSITION_IDX,
        });

        let resp: CreateOrderResult = self
            .client
            .post("/v5/order/create", &body)
            .await
            .map_err(|e| map_client_error(e, symbol))?;

        info!(symbol = %symbol, side = %side, qty = %quantity, order_id = %resp.order_id, "order accepted");

        Ok(PlacedOrder {
            order_id: resp.order_id,
            status: crate::domain::OrderStatus::New,
        })
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let body = json!({
            "category": self.category,
            "symbol": symbol,
            "buyLeverage": leverage.to_string(),
            "sellLeverage": leverage.to_string(),
        });

        match self.client.post::<IgnoredAny>("/v5/position/set-leverage", &body).await {
            Ok(_) => Ok(()),
            Err(ClientError::Api(api)) if api.code == CODE_LEVERAGE_NOT_MODIFIED => {
                debug!(symbol = %symbol, leverage = leverage, "leverage already set");
                Ok(())
            }
            Err(e) => Err(map_client_error(e, symbol)),
        }
    }

    async fn set_protective_levels(
        &self,
        symbol: &str,
        stop_loss: Decimal,
        take_profit: Decimal,
    ) -> Result<()> {
        let body = json!({
            "category": self.category,
            "symbol": symbol,
            "stopLoss": stop_loss.normalize().to_string(),
            "takeProfit": take_profit.normalize().to_string(),
            "tpslMode": "Full",
            "positionIdx": POSITION_IDX,
        });

        match self.client.post::<IgnoredAny>("/v5/position/trading-stop", &body).await {
            Ok(_) => Ok(()),
            Err(ClientError::Api(api)) if api.code == CODE_TPSL_NOT_MODIFIED => Ok(()),
            Err(e) => Err(map_client_error(e, symbol)),
        }
    }

    async fn get_open_position(&self, symbol: &str) -> Result<Option<Position>> {
        let resp: ListResult<PositionInfo> = self
            .client
            .get("/v5/position/list", &self.category_params(symbol), true)
            .await
            .map_err(|e| map_client_error(e, symbol))?;

        for info in resp.list {
            let size = parse_optional_decimal(&info.size).unwrap_or_default();
            if size.is_zero() {
                continue;
            }
            return Ok(Some(Position {
                symbol: info.symbol,
                side: parse_order_side(&info.side),
                size,
                entry_price: parse_optional_decimal(&info.avg_price).unwrap_or_default(),
                mark_price: parse_optional_decimal(&info.mark_price).unwrap_or_default(),
                unrealized_pnl: parse_optional_decimal(&info.unrealised_pnl).unwrap_or_default(),
                leverage: parse_optional_decimal(&info.leverage).unwrap_or(Decimal::ONE),
            }));
        }

        Ok(None)
    }

    async fn get_recent_orders(&self, symbol: &str, limit: u32) -> Result<Vec<Order>> {
        let mut params = self.category_params(symbol);
        params.push(("limit", limit.to_string()));

        let resp: ListResult<OrderInfo> = self
            .client
            .get("/v5/order/history", &params, true)
            .await
            .map_err(|e| map_client_error(e, symbol))?;

        Ok(resp.list.into_iter().map(OrderInfo::into_order).collect())
    }

    async fn get_closed_pnl(&self, symbol: &str, limit: u32) -> Result<Vec<ClosedPnl>> {
        let mut params = self.category_params(symbol);
        params.push(("limit", limit.to_string()));

        let resp: ListResult<ClosedPnlInfo> = self
            .client
            .get("/v5/position/closed-pnl", &params, true)
            .await
            .map_err(|e| map_client_error(e, symbol))?;

        resp.list.into_iter().map(ClosedPnlInfo::into_closed_pnl).collect()
    }

    async fn get_wallet_balance(&self, asset: &str) -> Result<Decimal> {
        let params = [
            ("accountType", ACCOUNT_TYPE.to_string()),
            ("coin", asset.to_string()),
        ];

        let resp: ListResult<WalletInfo> = self
            .client
            .get("/v5/account/wallet-balance", &params, true)
            .await
            .map_err(|e| map_client_error(e, asset))?;

        let balance = resp
            .list
            .iter()
            .flat_map(|w| w.coin.iter())
            .find(|c| c.coin.eq_ignore_ascii_case(asset))
            .and_then(|c| parse_optional_decimal(&c.wallet_balance))
            .unwrap_or_default();

        debug!(asset = %asset, balance = %balance, "fetched wallet balance");
        Ok(balance)
    }

    fn name(&self) -> &str {
        EXCHANGE_NAME
    }
}

/// `result` object of list endpoints.
#[derive(Debug, Deserialize)]
struct ListResult<T> {
    #[serde(default = "Vec::new")]
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerInfo {
    #[serde(default)]
    last_price: String,
    #[serde(default)]
    mark_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentInfo {
    lot_size_filter: LotSizeFilter,
    price_filter: Option<PriceFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LotSizeFilter {
    min_order_qty: String,
    max_order_qty: String,
    qty_step: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceFilter {
    #[serde(default)]
    tick_size: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderResult {
    order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionInfo {
    symbol: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    size: String,
    #[serde(default)]
    avg_price: String,
    #[serde(default)]
    mark_price: String,
    #[serde(default)]
    unrealised_pnl: String,
    #[serde(default)]
    leverage: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderInfo {
    order_id: String,
    symbol: String,
    side: String,
    #[serde(default)]
    qty: String,
    #[serde(default)]
    avg_price: String,
    order_status: String,
    #[serde(default)]
    reduce_only: bool,
    #[serde(default)]
    created_time: String,
}

impl OrderInfo {
    fn into_order(self) -> Order {
        Order {
            side: parse_order_side(&self.side),
            quantity: parse_optional_decimal(&self.qty).unwrap_or_default(),
            avg_price: parse_optional_decimal(&self.avg_price).unwrap_or_default(),
            status: parse_order_status(&self.order_status),
            reduce_only: self.reduce_only,
            created_at: parse_millis(&self.created_time),
            id: self.order_id,
            symbol: self.symbol,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClosedPnlInfo {
    order_id: String,
    symbol: String,
    #[serde(default)]
    qty: String,
    #[serde(default)]
    avg_entry_price: String,
    #[serde(default)]
    avg_exit_price: String,
    closed_pnl: String,
    #[serde(default)]
    updated_time: String,
}

impl ClosedPnlInfo {
    fn into_closed_pnl(self) -> Result<ClosedPnl> {
        Ok(ClosedPnl {
            closed_pnl: parse_decimal("closedPnl", &self.closed_pnl)?,
            quantity: parse_optional_decimal(&self.qty).unwrap_or_default(),
            entry_price: parse_optional_decimal(&self.avg_entry_price).unwrap_or_default(),
            exit_price: parse_optional_decimal(&self.avg_exit_price).unwrap_or_default(),
            closed_at: parse_millis(&self.updated_time),
            order_id: self.order_id,
            symbol: self.symbol,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletInfo {
    #[serde(default)]
    coin: Vec<CoinBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinBalance {
    coin: String,
    #[serde(default)]
    wallet_balance: String,
}

/// Maps Bybit client errors to exchange errors.
pub(crate) fn map_client_error(err: ClientError, context: &str) -> ExchangeError {
    match err {
        ClientError::Api(api_err) => match api_err.code {
            CODE_INVALID_API_KEY
            | CODE_INVALID_SIGNATURE
            | CODE_PERMISSION_DENIED
            | CODE_API_KEY_EXPIRED => ExchangeError::Authentication(api_err.message),
            CODE_TOO_MANY_VISITS | CODE_IP_RATE_LIMIT => {
                ExchangeError::RateLimited(format!("{}: {}", context, api_err.message))
            }
            CODE_INSUFFICIENT_BALANCE => ExchangeError::InsufficientFunds,
            HTTP_TOO_MANY_REQUESTS => {
                ExchangeError::RateLimited(format!("{}: {}", context, api_err.message))
            }
            // Gateway failures: the request may have been processed.
            HTTP_SERVER_ERRORS_START..=HTTP_SERVER_ERRORS_END => ExchangeError::Timeout(format!(
                "{}: http {} {}",
                context, api_err.code, api_err.message
            )),
            code => ExchangeError::Api {
                code,
                message: format!("{}: {}", context, api_err.message),
            },
        },
        ClientError::RateLimitExceeded { current, limit } => ExchangeError::RateLimited(format!(
            "local budget {}/{} per minute for {}",
            current, limit, context
        )),
        ClientError::Request(e) if e.is_connect() || e.is_builder() => {
            ExchangeError::Connection(format!("{}: {}", context, e))
        }
        ClientError::Request(e) => ExchangeError::Timeout(format!("{}: {}", context, e)),
        ClientError::Json(e) => ExchangeError::Parse(format!("{}: {}", context, e)),
        ClientError::MissingResult => ExchangeError::Parse(format!("{}: empty result", context)),
        ClientError::Header(e) => ExchangeError::Connection(format!("{}: {}", context, e)),
        ClientError::Signing(e) => ExchangeError::Authentication(e),
    }
}
