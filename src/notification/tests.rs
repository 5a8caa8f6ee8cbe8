//! Tests for notification formatting functions.

use super::*;
use crate::domain::{ClosedPnl, OrderSide, TradeFill};
use chrono::TimeZone;
use std::str::FromStr;
use std::time::Duration;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn fill(warnings: Vec<String>) -> TradeFill {
    TradeFill {
        symbol: "MNTUSDT".to_string(),
        order_id: "abc-1".to_string(),
        entry_price: d("0.8500"),
        executed_quantity: d("11.7"),
        stop_loss_price: d("0.833"),
        take_profit_price: d("0.884"),
        leverage: 3,
        warnings,
    }
}

fn position() -> Position {
    Position {
        symbol: "MNTUSDT".to_string(),
        side: OrderSide::Buy,
        size: d("10"),
        entry_price: d("1"),
        mark_price: d("1.05"),
        unrealized_pnl: d("0.5"),
        leverage: d("2"),
    }
}

// ==================== Helper function tests ====================

#[test]
fn test_format_duration_seconds() {
    assert_eq!(format_duration(Duration::from_secs(45)), "45s");
}

#[test]
fn test_format_duration_minutes() {
    assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
}

#[test]
fn test_format_duration_hours() {
    assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m");
}

#[test]
fn test_format_duration_days() {
    assert_eq!(format_duration(Duration::from_secs(93600)), "1d 2h");
}

#[test]
fn test_add_thousand_separators() {
    assert_eq!(add_thousand_separators(0), "0");
    assert_eq!(add_thousand_separators(999), "999");
    assert_eq!(add_thousand_separators(1000), "1,000");
    assert_eq!(add_thousand_separators(1234567), "1,234,567");
}

#[test]
fn test_escape_html() {
    assert_eq!(
        escape_html("<b>Tom & \"Jerry\"</b>"),
        "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;"
    );
    assert_eq!(escape_html("plain"), "plain");
}

// ==================== Formatter tests ====================

#[test]
fn test_format_announcement_escapes_title() {
    let data = AnnouncementData {
        title: "New <XYZ> Launchpool".to_string(),
        description: "Stake & earn".to_string(),
        url: "https://announcements.bybit.com/a?b=1&c=2".to_string(),
        published_at: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        symbol: "MNTUSDT".to_string(),
        action: "Opening long".to_string(),
    };

    let text = format_announcement(&data);
    assert!(text.contains("New &lt;XYZ&gt; Launchpool"));
    assert!(text.contains("Stake &amp; earn"));
    assert!(text.contains("b=1&amp;c=2"));
    assert!(text.contains("2023-11-14 22:13:20 UTC"));
}

#[test]
fn test_format_execution_filled() {
    let data = ExecutionData {
        result: TradeResult::Filled(fill(vec![])),
        trigger: TradeTrigger::Manual,
        elapsed: Duration::from_secs(2),
    };

    let text = format_execution(&data);
    assert!(text.contains("Long opened"));
    assert!(text.contains("Entry: <b>0.85</b>"));
    assert!(text.contains("Leverage: 3x"));
    assert!(text.contains("manual test"));
    assert!(!text.contains("Needs attention"));
}

#[test]
fn test_format_execution_degraded_lists_warnings() {
    let data = ExecutionData {
        result: TradeResult::Filled(fill(vec!["stop loss not attached".to_string()])),
        trigger: TradeTrigger::Announcement("Launchpool <X>".to_string()),
        elapsed: Duration::from_secs(1),
    };

    let text = format_execution(&data);
    assert!(text.contains("Needs attention"));
    assert!(text.contains("• stop loss not attached"));
    assert!(text.contains("Launchpool &lt;X&gt;"));
}

#[test]
fn test_format_execution_failures_are_distinct() {
    let render = |kind| {
        format_execution(&ExecutionData {
            result: TradeResult::failed("MNTUSDT", kind, "boom"),
            trigger: TradeTrigger::Manual,
            elapsed: Duration::ZERO,
        })
    };

    assert!(render(TradeErrorKind::PriceUnavailable).contains("price unavailable"));
    assert!(render(TradeErrorKind::OrderRejected).contains("Order rejected"));
    assert!(render(TradeErrorKind::SubmissionUncertain).contains("Check the position"));
    assert!(render(TradeErrorKind::Busy).contains("another trade is running"));
}

#[test]
fn test_format_health_degraded_and_recovered() {
    let degraded = format_health(&HealthData {
        component: "announcements".to_string(),
        degraded: true,
        consecutive_failures: 5,
        last_error: Some("timeout".to_string()),
    });
    assert!(degraded.contains("Bot degraded"));
    assert!(degraded.contains("Consecutive failures: 5"));
    assert!(degraded.contains("timeout"));

    let recovered = format_health(&HealthData {
        component: "announcements".to_string(),
        degraded: false,
        consecutive_failures: 0,
        last_error: None,
    });
    assert!(recovered.contains("Recovered"));
}

#[test]
fn test_format_position_closed_without_pnl() {
    let text = format_position(&PositionData::Closed(ClosedPosition {
        last_seen: position(),
        realized: None,
    }));
    assert!(text.contains("Position closed"));
    assert!(text.contains("Realized PnL: unavailable"));
}

#[test]
fn test_format_position_closed_with_pnl() {
    let realized = ClosedPnl {
        order_id: "close-1".to_string(),
        symbol: "MNTUSDT".to_string(),
        quantity: d("10"),
        entry_price: d("1"),
        exit_price: d("1.04"),
        closed_pnl: d("0.39876"),
        closed_at: Utc::now(),
    };
    let text = format_position(&PositionData::Closed(ClosedPosition {
        last_seen: position(),
        realized: Some(realized),
    }));
    assert!(text.contains("Exit: 1.04"));
    assert!(text.contains("0.3988 USDT"));
}

#[test]
fn test_format_account_status_with_position() {
    let text = format_account_status("MNTUSDT", Ok(d("1234.567")), Ok(Some(position())));
    assert!(text.contains("1234.57 USDT"));
    assert!(text.contains("Buy 10 @ 1"));
    assert!(text.contains("PnL: <b>5"));
}

#[test]
fn test_format_account_status_partial_failure() {
    let text = format_account_status("MNTUSDT", Err("timeout".to_string()), Ok(None));
    assert!(text.contains("Balance: unavailable (timeout)"));
    assert!(text.contains("none"));
}

#[test]
fn test_format_startup_lists_risk() {
    let text = format_startup(&StartupData {
        version: "0.1.0".to_string(),
        symbol: "MNTUSDT".to_string(),
        testnet: true,
        poll_interval: Duration::from_secs(30),
        risk: RiskParameters::default(),
    });
    assert!(text.contains("TESTNET"));
    assert!(text.contains("Quantity: 10 USDT"));
    assert!(text.contains("Leverage: 1x"));
}

#[test]
fn test_format_overview_lists_degraded_components() {
    let mut data = OverviewData {
        uptime: Duration::from_secs(3700),
        polls: 12_345,
        poll_failures: 2,
        announcements: 1,
        trades_attempted: 1,
        successful_trades: 1,
        failed_trades: 0,
        degraded_fills: 0,
        testnet: false,
        degraded_components: vec![],
    };
    let text = format_overview(&data);
    assert!(text.contains("12,345"));
    assert!(text.contains("1h 1m"));
    assert!(text.contains("All components healthy"));

    data.degraded_components = vec!["announcements".to_string(), "position monitor".to_string()];
    let text = format_overview(&data);
    assert!(text.contains("Degraded: announcements, position monitor"));
}

#[test]
fn test_format_event_dispatches() {
    let event = Event::shutdown(ShutdownData {
        reason: "signal".to_string(),
        uptime: Duration::from_secs(61),
        graceful: true,
    });
    assert_eq!(event.event_type, EventType::Shutdown);
    let text = format_event(&event);
    assert!(text.contains("Bot stopped"));
    assert!(text.contains("1m 1s"));
}

// ==================== Noop ====================

#[tokio::test]
async fn test_noop_notifier() {
    let notifier = NoopNotifier::new();
    assert!(!notifier.is_enabled(EventType::Execution));
    let event = Event::error(ErrorData {
        component: "monitor".to_string(),
        message: "failed".to_string(),
        error: None,
    });
    assert!(notifier.send(&event).await.is_ok());
    notifier.send_async(event);
    assert!(notifier.close().await.is_ok());
}
