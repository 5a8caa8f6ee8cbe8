//! Operator notifications and the Telegram chat channel.

mod chat;
mod notifier;
mod telegram;

pub use chat::{ChatEvent, ChatInput, ChatTransport, InlineButton, Keyboard};
pub use notifier::{
    AnnouncementData, ErrorData, Event, EventData, EventType, ExecutionData, HealthData,
    NoopNotifier, NotificationError, Notifier, OverviewData, PositionData, ShutdownData,
    StartupData, TradeTrigger, escape_html, format_account_status, format_event,
};
pub use telegram::{TelegramClient, TelegramNotifier, spawn_update_listener};
