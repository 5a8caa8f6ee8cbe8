//! Notification events, the `Notifier` trait and HTML formatting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::time::Duration;

use crate::domain::{Position, RiskField, RiskParameters, TradeErrorKind, TradeResult};
use crate::trading::{ClosedPosition, PositionStatus, ProximityWarning};

/// Notification event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// New listing announcement detected
    Announcement,
    /// Trade attempt finished (filled or failed)
    Execution,
    /// Position opened, near a level, or closed
    Position,
    /// A periodic task failed
    Error,
    /// A component became degraded or recovered
    Health,
    Startup,
    Shutdown,
    /// Periodic statistics
    Overview,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Announcement => write!(f, "announcement"),
            EventType::Execution => write!(f, "execution"),
            EventType::Position => write!(f, "position"),
            EventType::Error => write!(f, "error"),
            EventType::Health => write!(f, "health"),
            EventType::Startup => write!(f, "startup"),
            EventType::Shutdown => write!(f, "shutdown"),
            EventType::Overview => write!(f, "overview"),
        }
    }
}

/// A detected announcement and what the bot is about to do.
#[derive(Debug, Clone)]
pub struct AnnouncementData {
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub symbol: String,
    pub action: String,
}

/// What started a trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeTrigger {
    /// Announcement title.
    Announcement(String),
    /// Operator pressed "Test Announcement".
    Manual,
}

#[derive(Debug, Clone)]
pub struct ExecutionData {
    pub result: TradeResult,
    pub trigger: TradeTrigger,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub enum PositionData {
    Opened(PositionStatus),
    Warning(PositionStatus),
    Closed(ClosedPosition),
}

#[derive(Debug, Clone)]
pub struct ErrorData {
    pub component: String,
    pub message: String,
    pub error: Option<String>,
}

/// Degradation or recovery of a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthData {
    pub component: String,
    pub degraded: bool,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StartupData {
    pub version: String,
    pub symbol: String,
    pub testnet: bool,
    pub poll_interval: Duration,
    pub risk: RiskParameters,
}

#[derive(Debug, Clone)]
pub struct ShutdownData {
    pub reason: String,
    pub uptime: Duration,
    pub graceful: bool,
}

#[derive(Debug, Clone)]
pub struct OverviewData {
    pub uptime: Duration,
    pub polls: u64,
    pub poll_failures: u64,
    pub announcements: u64,
    pub trades_attempted: u64,
    pub successful_trades: u64,
    pub failed_trades: u64,
    pub degraded_fills: u64,
    pub testnet: bool,
    pub degraded_components: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum EventData {
    Announcement(AnnouncementData),
    Execution(ExecutionData),
    Position(PositionData),
    Error(ErrorData),
    Health(HealthData),
    Startup(StartupData),
    Shutdown(ShutdownData),
    Overview(OverviewData),
}

/// Notification event.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl Event {
    pub fn new(event_type: EventType, data: EventData) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn announcement(data: AnnouncementData) -> Self {
        Self::new(EventType::Announcement, EventData::Announcement(data))
    }

    pub fn execution(data: ExecutionData) -> Self {
        Self::new(EventType::Execution, EventData::Execution(data))
    }

    pub fn position(data: PositionData) -> Self {
        Self::new(EventType::Position, EventData::Position(data))
    }

    pub fn error(data: ErrorData) -> Self {
        Self::new(EventType::Error, EventData::Error(data))
    }

    pub fn health(data: HealthData) -> Self {
        Self::new(EventType::Health, EventData::Health(data))
    }

    pub fn startup(data: StartupData) -> Self {
        Self::new(EventType::Startup, EventData::Startup(data))
    }

    pub fn shutdown(data: ShutdownData) -> Self {
        Self::new(EventType::Shutdown, EventData::Shutdown(data))
    }

    pub fn overview(data: OverviewData) -> Self {
        Self::new(EventType::Overview, EventData::Overview(data))
    }
}

/// Notifier delivers events to the operator.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Send delivers the event and waits for the result.
    async fn send(&self, event: &Event) -> Result<(), NotificationError>;

    /// SendAsync queues the event without waiting.
    fn send_async(&self, event: Event);

    /// IsEnabled reports whether events of this type are delivered.
    fn is_enabled(&self, event_type: EventType) -> bool;

    /// Close flushes pending events.
    async fn close(&self) -> Result<(), NotificationError>;
}

/// Notification error
#[derive(Debug, Clone)]
pub struct NotificationError {
    pub message: String,
}

impl fmt::Display for NotificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationError: {}", self.message)
    }
}

impl std::error::Error for NotificationError {}

impl NotificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// NoopNotifier drops every event; used when Telegram is disabled.
pub struct NoopNotifier;

impl NoopNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _event: &Event) -> Result<(), NotificationError> {
        Ok(())
    }

    fn send_async(&self, _event: Event) {}

    fn is_enabled(&self, _event_type: EventType) -> bool {
        false
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

// === Formatting ===

pub fn format_announcement(data: &AnnouncementData) -> String {
    format!(
        "📢 <b>New Launchpool announcement</b>\n\n\
         <b>{}</b>\n\
         {}\n\
         🔗 <a href=\"{}\">Open announcement</a>\n\
         🕒 Published: {}\n\n\
         ➡️ {} on {}",
        escape_html(&data.title),
        escape_html(&data.description),
        escape_html(&data.url),
        data.published_at.format("%Y-%m-%d %H:%M:%S UTC"),
        escape_html(&data.action),
        escape_html(&data.symbol),
    )
}

pub fn format_execution(data: &ExecutionData) -> String {
    let trigger = match &data.trigger {
        TradeTrigger::Announcement(title) => format!("announcement \"{}\"", escape_html(title)),
        TradeTrigger::Manual => "manual test".to_string(),
    };

    match &data.result {
        TradeResult::Filled(fill) => {
            let mut text = format!(
                "✅ <b>Long opened</b> {}\n\n\
                 Trigger: {}\n\
                 Entry: <b>{}</b>\n\
                 Quantity: {}\n\
                 Stop Loss: {}\n\
                 Take Profit: {}\n\
                 Leverage: {}x\n\
                 Order: <code>{}</code>\n\
                 Took: {}",
                escape_html(&fill.symbol),
                trigger,
                fill.entry_price.normalize(),
                fill.executed_quantity.normalize(),
                fill.stop_loss_price.normalize(),
                fill.take_profit_price.normalize(),
                fill.leverage,
                escape_html(&fill.order_id),
                format_duration(data.elapsed),
            );
            if fill.is_degraded() {
                text.push_str("\n\n⚠️ <b>Needs attention</b>");
                for warning in &fill.warnings {
                    text.push_str(&format!("\n• {}", escape_html(warning)));
                }
            }
            text
        }
        TradeResult::Failed(failure) => {
            let heading = match failure.kind {
                TradeErrorKind::PriceUnavailable => "❌ <b>Trade aborted: price unavailable</b>",
                TradeErrorKind::OrderRejected => "❌ <b>Order rejected</b>",
                TradeErrorKind::SubmissionUncertain => {
                    "⚠️ <b>Order outcome unknown.</b> Check the position before retrying"
                }
                TradeErrorKind::Busy => "⏳ <b>Trade skipped: another trade is running</b>",
            };
            format!(
                "{} {}\n\n\
                 Trigger: {}\n\
                 Reason: {}",
                heading,
                escape_html(&failure.symbol),
                trigger,
                escape_html(&failure.message),
            )
        }
    }
}

pub fn format_position(data: &PositionData) -> String {
    match data {
        PositionData::Opened(status) => format!(
            "📌 <b>Position open</b> {}\n\n{}",
            escape_html(&status.position.symbol),
            position_lines(status)
        ),
        PositionData::Warning(status) => {
            let level = match status.warning {
                Some(ProximityWarning::NearStopLoss) => "stop loss",
                Some(ProximityWarning::NearTakeProfit) => "take profit",
                None => "a protective level",
            };
            format!(
                "⚠️ <b>Price near {}</b> {}\n\n{}",
                level,
                escape_html(&status.position.symbol),
                position_lines(status)
            )
        }
        PositionData::Closed(closed) => {
            let result = match &closed.realized {
                Some(pnl) => format!(
                    "Exit: {}\nRealized PnL: <b>{} USDT</b>",
                    pnl.exit_price.normalize(),
                    pnl.closed_pnl.round_dp(4).normalize()
                ),
                None => "Realized PnL: unavailable".to_string(),
            };
            format!(
                "🏁 <b>Position closed</b> {}\n\n\
                 Entry: {}\n\
                 Size: {}\n\
                 {}",
                escape_html(&closed.last_seen.symbol),
                closed.last_seen.entry_price.normalize(),
                closed.last_seen.size.normalize(),
                result
            )
        }
    }
}

fn position_lines(status: &PositionStatus) -> String {
    format!(
        "Size: {}\n\
         Entry: {}\n\
         Mark: {}\n\
         PnL: <b>{}%</b> ({} USDT)\n\
         Stop Loss: {}\n\
         Take Profit: {}",
        status.position.size.normalize(),
        status.position.entry_price.normalize(),
        status.position.mark_price.normalize(),
        status.pnl_pct.round_dp(2),
        status.position.unrealized_pnl.round_dp(4).normalize(),
        status.stop_loss_price.normalize(),
        status.take_profit_price.normalize(),
    )
}

pub fn format_error(data: &ErrorData) -> String {
    let error_str = data
        .error
        .as_ref()
        .map(|e| format!("\nError: {}", escape_html(e)))
        .unwrap_or_default();

    format!(
        "⚠️ <b>Error</b>\n\n\
         Component: {}\n\
         Message: {}{}\n\n\
         ⏰ {}",
        escape_html(&data.component),
        escape_html(&data.message),
        error_str,
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_health(data: &HealthData) -> String {
    if data.degraded {
        format!(
            "🚨 <b>Bot degraded</b>\n\n\
             Component: {}\n\
             Consecutive failures: {}\n\
             Last error: {}\n\n\
             Retrying on schedule. Manual action may be needed.",
            escape_html(&data.component),
            data.consecutive_failures,
            escape_html(data.last_error.as_deref().unwrap_or("unknown")),
        )
    } else {
        format!(
            "💚 <b>Recovered</b>\n\nComponent: {} is working again.",
            escape_html(&data.component)
        )
    }
}

pub fn format_startup(data: &StartupData) -> String {
    format!(
        "🤖 <b>Bot started</b>\n\n\
         Version: {}\n\
         Network: {}\n\
         Symbol: {}\n\
         Poll interval: {}\n\n\
         {}\n\n\
         ⏰ {}",
        escape_html(&data.version),
        network_label(data.testnet),
        escape_html(&data.symbol),
        format_duration(data.poll_interval),
        format_risk(&data.risk),
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_shutdown(data: &ShutdownData) -> String {
    let status = if data.graceful {
        "✅ Graceful"
    } else {
        "⚠️ Forced"
    };

    format!(
        "🛑 <b>Bot stopped</b>\n\n\
         Reason: {}\n\
         Status: {}\n\
         Uptime: {}\n\n\
         ⏰ {}",
        escape_html(&data.reason),
        status,
        format_duration(data.uptime),
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_overview(data: &OverviewData) -> String {
    let health = if data.degraded_components.is_empty() {
        "🟢 All components healthy".to_string()
    } else {
        format!(
            "🔴 Degraded: {}",
            escape_html(&data.degraded_components.join(", "))
        )
    };

    format!(
        "📊 <b>Overview</b> {}\n\n\
         ⏱ Uptime: {}\n\
         🔄 Feed polls: {} ({} failed)\n\
         📢 Announcements: {}\n\n\
         🎯 Trades attempted: {}\n\
         ✅ Filled: {} ({} degraded)\n\
         ❌ Failed: {}\n\n\
         {}\n\
         ⏰ {}",
        network_label(data.testnet),
        format_duration(data.uptime),
        add_thousand_separators(data.polls),
        add_thousand_separators(data.poll_failures),
        data.announcements,
        data.trades_attempted,
        data.successful_trades,
        data.degraded_fills,
        data.failed_trades,
        health,
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Formats the account status reply of the chat menu.
pub fn format_account_status(
    symbol: &str,
    balance: Result<Decimal, String>,
    position: Result<Option<Position>, String>,
) -> String {
    let balance = match balance {
        Ok(b) => format!("<b>{} USDT</b>", b.round_dp(2)),
        Err(e) => format!("unavailable ({})", escape_html(&e)),
    };

    let position = match position {
        Ok(Some(p)) => {
            let pnl_pct = p
                .pnl_pct()
                .map(|pct| format!("{}%", pct.round_dp(2)))
                .unwrap_or_else(|| "n/a".to_string());
            format!(
                "{} {} @ {}\nMark: {}\nPnL: <b>{}</b> ({} USDT)",
                p.side,
                p.size.normalize(),
                p.entry_price.normalize(),
                p.mark_price.normalize(),
                pnl_pct,
                p.unrealized_pnl.round_dp(4).normalize()
            )
        }
        Ok(None) => "none".to_string(),
        Err(e) => format!("unavailable ({})", escape_html(&e)),
    };

    format!(
        "💼 <b>Account Status</b>\n\n\
         Balance: {}\n\n\
         Position {}:\n{}",
        balance,
        escape_html(symbol),
        position
    )
}

/// Formats an event as Telegram HTML.
pub fn format_event(event: &Event) -> String {
    match &event.data {
        EventData::Announcement(data) => format_announcement(data),
        EventData::Execution(data) => format_execution(data),
        EventData::Position(data) => format_position(data),
        EventData::Error(data) => format_error(data),
        EventData::Health(data) => format_health(data),
        EventData::Startup(data) => format_startup(data),
        EventData::Shutdown(data) => format_shutdown(data),
        EventData::Overview(data) => format_overview(data),
    }
}

// === Helpers ===

/// Escapes text for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn format_risk(risk: &RiskParameters) -> String {
    RiskField::ALL
        .iter()
        .map(|field| format!("{}: {}", field.label(), risk.display_value(*field)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn network_label(testnet: bool) -> &'static str {
    if testnet { "🧪 TESTNET" } else { "🚀 MAINNET" }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

fn add_thousand_separators(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
