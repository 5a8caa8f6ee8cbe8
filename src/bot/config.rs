//! Bot configuration and injected collaborators.

use std::sync::Arc;

use crate::announcements::AnnouncementFeed;
use crate::config::Config;
use crate::exchanges::Exchange;
use crate::notification::{ChatTransport, Notifier};
use crate::settings::{Settings, SettingsStore};

/// Bot configuration options.
pub struct BotConfig {
    /// Application configuration.
    pub app_config: Config,
    /// Application version.
    pub version: String,
}

/// The operator chat: where dialog replies go and the only origin accepted.
#[derive(Clone)]
pub struct ChatChannel {
    pub transport: Arc<dyn ChatTransport>,
    pub chat_id: String,
}

/// Long-lived collaborators shared by every bot task.
pub struct BotComponents {
    pub exchange: Arc<dyn Exchange>,
    /// `None` disables announcement polling.
    pub feed: Option<Arc<dyn AnnouncementFeed>>,
    pub store: Arc<dyn SettingsStore>,
    /// Settings as loaded at startup.
    pub settings: Settings,
    pub notifier: Arc<dyn Notifier>,
    /// `None` disables the chat menu.
    pub chat: Option<ChatChannel>,
}
