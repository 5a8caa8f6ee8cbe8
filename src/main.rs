mod announcements;
mod bot;
mod config;
mod dialog;
mod domain;
mod exchanges;
mod notification;
mod settings;
mod trading;

use bot::Bot;
use config::Config;
use exchanges::Exchange;
use exchanges::bybit::BybitExchange;
use std::env;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";
const BALANCE_ASSET: &str = "USDT";

fn parse_config_path() -> String {
    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

fn init_tracing(log_level: Option<&str>) {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config_path = parse_config_path();

    if env::args().any(|arg| arg == "--check-exchange") {
        check_exchange(&config_path).await;
        return;
    }

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return;
        }
    };
    init_tracing(config.app.log_level.as_deref());

    let bot = match Bot::from_config_path(&config_path).await {
        Ok(bot) => Arc::new(bot),
        Err(e) => {
            error!(error = %e, "Failed to create bot");
            return;
        }
    };

    info!(config = %config_path, env = %config.app.env, "Bot initialized");

    if let Err(e) = bot.start().await {
        error!(error = %e, "Bot error");
        return;
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    if let Err(e) = bot.stop().await {
        error!(error = %e, "Failed to stop bot");
    }
}

/// Connects to Bybit with the configured credentials and prints what the
/// bot would trade with, then exits.
async fn check_exchange(config_path: &str) {
    let config = match Config::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return;
        }
    };
    init_tracing(config.app.log_level.as_deref());

    let exchange = match BybitExchange::from_config(&config.exchange) {
        Ok(exchange) => exchange,
        Err(e) => {
            error!(error = %e, "Failed to create exchange");
            return;
        }
    };

    let network = if exchange.is_testnet() { "testnet" } else { "mainnet" };
    info!(network, name = exchange.name(), "Checking exchange...");

    match exchange.connect().await {
        Ok(()) => info!("Exchange connected"),
        Err(e) => {
            error!(error = %e, "Exchange connection failed");
            return;
        }
    }

    let symbol = &config.trading.symbol;

    match exchange.get_wallet_balance(BALANCE_ASSET).await {
        Ok(balance) => info!(asset = BALANCE_ASSET, balance = %balance, "Wallet balance"),
        Err(e) => error!(error = %e, "Failed to get wallet balance"),
    }

    match exchange.get_mark_price(symbol).await {
        Ok(price) => info!(symbol = %symbol, mark_price = %price, "Mark price"),
        Err(e) => error!(symbol = %symbol, error = %e, "Failed to get mark price"),
    }

    match exchange.get_instrument_rules(symbol).await {
        Ok(rules) => info!(
            symbol = %symbol,
            min_qty = %rules.min_qty,
            max_qty = %rules.max_qty,
            qty_step = %rules.qty_step,
            "Instrument rules"
        ),
        Err(e) => error!(symbol = %symbol, error = %e, "Failed to get instrument rules"),
    }

    info!("Check completed");
}
