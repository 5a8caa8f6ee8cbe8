//! Main listing bot implementation.
//!
//! Coordinates all components: announcement watcher, trade executor,
//! position monitor, settings dialog and notifications. Every periodic job
//! runs on its own timer so a slow exchange call in one never delays the
//! others.

mod config;
mod error;
mod health;
mod stats;

pub use config::{BotComponents, BotConfig, ChatChannel};
pub use error::BotError;
pub use health::{HealthChange, HealthTracker};
pub use stats::Stats;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::announcements::{AnnouncementFeed, AnnouncementWatcher};
use crate::config::Config;
use crate::dialog::{ConfigDialog, DialogAction, DialogInput, UnknownAction};
use crate::domain::{TradeErrorKind, TradeResult};
use crate::exchanges::bybit::{BybitAnnouncementFeed, BybitExchange};
use crate::exchanges::{Exchange, ExchangeError};
use crate::notification::{
    AnnouncementData, ChatEvent, ChatInput, ErrorData, Event, ExecutionData, Keyboard,
    NoopNotifier, Notifier, OverviewData, PositionData, ShutdownData, StartupData, TelegramClient,
    TelegramNotifier, TradeTrigger, format_account_status, spawn_update_listener,
};
use crate::settings::{FileSettingsStore, Settings, SettingsStore, load_or_default};
use crate::trading::{MonitorEvent, PositionMonitor, TradeExecutor};

const COMPONENT_ANNOUNCEMENTS: &str = "announcements";
const COMPONENT_MONITOR: &str = "position monitor";
const COMPONENT_EXCHANGE: &str = "exchange";
const COMPONENT_CHAT: &str = "chat";
const BALANCE_ASSET: &str = "USDT";
const UNAUTHORIZED_REPLY: &str = "⛔ This bot is private.";
const UNKNOWN_INPUT_REPLY: &str = "Unknown command. Send /start to open the menu.";

/// Main listing bot that coordinates all components.
pub struct Bot {
    cfg: Config,
    version: String,

    exchange: Arc<dyn Exchange>,
    executor: TradeExecutor,
    watcher: Option<Mutex<AnnouncementWatcher>>,
    monitor: Option<Mutex<PositionMonitor>>,

    // Lock order: dialog before settings.
    dialog: Mutex<ConfigDialog>,
    settings: Mutex<Settings>,
    store: Arc<dyn SettingsStore>,

    notifier: Arc<dyn Notifier>,
    chat: Option<ChatChannel>,
    chat_events: Mutex<Option<mpsc::Receiver<ChatEvent>>>,

    // Runtime state
    health: Mutex<HealthTracker>,
    stats: Mutex<Stats>,
    started_at: Mutex<Option<Instant>>,
    running: Mutex<bool>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Bot {
    /// Builds the bot from a YAML config file: Bybit exchange and feed,
    /// file settings store, Telegram when enabled.
    pub async fn from_config_path(path: &str) -> Result<Self, BotError> {
        let config = Config::load(path)?;

        let exchange = BybitExchange::from_config(&config.exchange)?;
        info!(testnet = exchange.is_testnet(), category = %config.exchange.category, "Bybit exchange created");
        let exchange: Arc<dyn Exchange> = Arc::new(exchange);

        let feed: Option<Arc<dyn AnnouncementFeed>> = if config.announcements.enabled {
            let feed = BybitAnnouncementFeed::from_config(
                &config.announcements,
                config.exchange.request_timeout(),
            )?;
            Some(Arc::new(feed))
        } else {
            None
        };

        let store = Arc::new(FileSettingsStore::new(&config.trading.settings_path));
        let settings = load_or_default(
            store.as_ref(),
            config.trading.defaults,
            config.trading.min_notional,
        )
        .await?;
        info!(
            path = %store.path().display(),
            password_set = settings.has_password(),
            "settings loaded"
        );

        let mut notifier: Arc<dyn Notifier> = Arc::new(NoopNotifier::new());
        let mut chat = None;
        let mut telegram_client = None;

        if let Some(telegram) = config.telegram() {
            let created = TelegramClient::new(&telegram.bot_token).map(Arc::new).and_then(|client| {
                TelegramNotifier::new(client.clone(), telegram.clone()).map(|n| (client, n))
            });

            match created {
                Ok((client, telegram_notifier)) => {
                    notifier = Arc::new(telegram_notifier);
                    chat = Some(ChatChannel {
                        transport: client.clone(),
                        chat_id: telegram.chat_id.clone(),
                    });
                    telegram_client = Some((client, telegram.poll_timeout()));
                    info!("Telegram notifier created");
                }
                Err(e) => {
                    warn!(error = %e, "Failed to create Telegram notifier");
                }
            }
        }

        let bot = Self::with_components(
            BotConfig {
                app_config: config,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            BotComponents {
                exchange,
                feed,
                store,
                settings,
                notifier,
                chat,
            },
        );

        if let Some((client, poll_timeout)) = telegram_client {
            let events = spawn_update_listener(client, poll_timeout, bot.shutdown_signal());
            bot.attach_chat_events(events).await;
        }

        Ok(bot)
    }

    /// Creates a bot around already constructed collaborators.
    pub fn with_components(cfg: BotConfig, components: BotComponents) -> Self {
        let config = cfg.app_config;

        let executor = TradeExecutor::new(components.exchange.clone(), &config.trading);

        let watcher = components
            .feed
            .filter(|_| config.announcements.enabled)
            .map(|feed| {
                // Only announcements published after startup trigger trades.
                Mutex::new(AnnouncementWatcher::new(
                    feed,
                    config.announcements.tag.clone(),
                    config.announcements.announcement_type.clone(),
                    Utc::now().timestamp_millis(),
                ))
            });

        let monitor = config.monitor.enabled.then(|| {
            Mutex::new(PositionMonitor::new(
                components.exchange.clone(),
                config.trading.symbol.clone(),
                &config.monitor,
                config.trading.price_precision,
            ))
        });

        let dialog = ConfigDialog::new(&components.settings, config.trading.min_notional);
        let health = HealthTracker::new(config.app.failure_threshold());
        let (shutdown, _) = watch::channel(false);

        Bot {
            version: cfg.version,
            exchange: components.exchange,
            executor,
            watcher,
            monitor,
            dialog: Mutex::new(dialog),
            settings: Mutex::new(components.settings),
            store: components.store,
            notifier: components.notifier,
            chat: components.chat,
            chat_events: Mutex::new(None),
            health: Mutex::new(health),
            stats: Mutex::new(Stats::default()),
            started_at: Mutex::new(None),
            running: Mutex::new(false),
            shutdown,
            tasks: Mutex::new(Vec::new()),
            cfg: config,
        }
    }

    /// Receiver that flips to `true` when the bot stops.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Sets the inbound chat stream consumed by the chat task.
    pub async fn attach_chat_events(&self, events: mpsc::Receiver<ChatEvent>) {
        *self.chat_events.lock().await = Some(events);
    }

    /// Starts the periodic tasks and returns; they run until [`Bot::stop`].
    pub async fn start(self: &Arc<Self>) -> Result<(), BotError> {
        {
            let mut running = self.running.lock().await;
            if *running {
                return Err(BotError::AlreadyRunning);
            }
            *running = true;
        }

        {
            let mut started_at = self.started_at.lock().await;
            *started_at = Some(Instant::now());
        }

        if let Err(e) = self.exchange.connect().await {
            warn!(error = %e, "exchange connectivity check failed");
            self.record_failure(COMPONENT_EXCHANGE, &e.to_string(), is_fatal(&e))
                .await;
        }

        let risk = self.settings.lock().await.risk;
        let poll_interval = self.cfg.announcements.poll_interval();

        info!(
            version = %self.version,
            symbol = %self.executor.symbol(),
            testnet = self.cfg.exchange.testnet,
            announcements = self.watcher.is_some(),
            monitor = self.monitor.is_some(),
            chat = self.chat.is_some(),
            "Starting listing bot"
        );

        self.send_notification(Event::startup(StartupData {
            version: self.version.clone(),
            symbol: self.executor.symbol().to_string(),
            testnet: self.cfg.exchange.testnet,
            poll_interval,
            risk,
        }))
        .await;

        let mut tasks = Vec::new();

        if self.watcher.is_some() {
            tasks.push(self.spawn_periodic(COMPONENT_ANNOUNCEMENTS, poll_interval, |bot| async move {
                bot.poll_announcements().await
            }));
        }

        if self.monitor.is_some() {
            tasks.push(self.spawn_periodic(
                COMPONENT_MONITOR,
                self.cfg.monitor.interval(),
                |bot| async move { bot.check_position().await },
            ));
        }

        if let Some(telegram) = self.cfg.telegram().filter(|t| t.notify_overview) {
            tasks.push(self.spawn_periodic(
                "overview",
                telegram.overview_interval(),
                |bot| async move { bot.send_overview().await },
            ));
        }

        if let Some(events) = self.chat_events.lock().await.take() {
            tasks.push(self.spawn_chat_loop(events));
        }

        self.tasks.lock().await.extend(tasks);
        Ok(())
    }

    /// Gracefully stops the bot. Jobs that are mid-run finish first.
    pub async fn stop(&self) -> Result<(), BotError> {
        {
            let mut running = self.running.lock().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        info!("Stopping bot...");
        self.shutdown.send_replace(true);

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "task ended abnormally");
            }
        }

        let uptime = self.uptime().await;

        self.send_notification(Event::shutdown(ShutdownData {
            reason: "graceful shutdown".to_string(),
            uptime,
            graceful: true,
        }))
        .await;

        let _ = self.notifier.close().await;

        info!(uptime = ?uptime, "Bot stopped");

        Ok(())
    }

    /// Returns a copy of the current statistics.
    pub async fn stats(&self) -> Stats {
        self.stats.lock().await.clone()
    }

    /// Returns true if the bot is currently running.
    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    /// Returns how long the bot has been running.
    pub async fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .await
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Runs `job` every `period` until shutdown. A panic inside one run is
    /// logged and reported; the next tick runs normally.
    fn spawn_periodic<F, Fut>(self: &Arc<Self>, name: &'static str, period: Duration, job: F) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let bot = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(task = name, period = ?period, "periodic task started");

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        let run = AssertUnwindSafe(job(Arc::clone(&bot))).catch_unwind().await;
                        if let Err(panic) = run {
                            let message = panic_message(&*panic);
                            error!(task = name, panic = %message, "periodic task panicked");
                            bot.record_failure(name, &message, false).await;
                        }
                    }
                }
            }

            info!(task = name, "periodic task stopped");
        })
    }

    fn spawn_chat_loop(self: &Arc<Self>, mut events: mpsc::Receiver<ChatEvent>) -> JoinHandle<()> {
        let bot = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            info!("chat task started");
            loop {
                let event = tokio::select! {
                    _ = shutdown.changed() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                let handled = AssertUnwindSafe(bot.handle_chat_event(event))
                    .catch_unwind()
                    .await;
                if let Err(panic) = handled {
                    let message = panic_message(&*panic);
                    error!(panic = %message, "chat handler panicked");
                    bot.record_failure(COMPONENT_CHAT, &message, false).await;
                }
            }
            info!("chat task stopped");
        })
    }

    /// Polls the feed once and trades on a new announcement.
    async fn poll_announcements(&self) {
        let Some(watcher) = &self.watcher else {
            return;
        };

        let polled = watcher.lock().await.poll_once().await;
        self.stats.lock().await.polls += 1;

        let announcement = match polled {
            Ok(Some(announcement)) => announcement,
            Ok(None) => {
                self.record_success(COMPONENT_ANNOUNCEMENTS).await;
                return;
            }
            Err(e) => {
                self.stats.lock().await.poll_failures += 1;
                warn!(error = %e, "announcement poll failed");
                self.record_failure(COMPONENT_ANNOUNCEMENTS, &e.to_string(), false)
                    .await;
                return;
            }
        };

        self.record_success(COMPONENT_ANNOUNCEMENTS).await;
        self.stats.lock().await.announcements += 1;

        info!(
            title = %announcement.title,
            published_at = %announcement.published_at(),
            symbol = %self.executor.symbol(),
            "new announcement, opening long"
        );

        // Queued so a slow chat cannot delay the entry.
        self.notifier.send_async(Event::announcement(AnnouncementData {
            title: announcement.title.clone(),
            description: announcement.description.clone(),
            url: announcement.url.clone(),
            published_at: announcement.published_at(),
            symbol: self.executor.symbol().to_string(),
            action: "Opening long".to_string(),
        }));

        self.run_trade(TradeTrigger::Announcement(announcement.title)).await;
    }

    /// Executes one long entry with the current parameters and reports it.
    async fn run_trade(&self, trigger: TradeTrigger) -> TradeResult {
        let params = self.settings.lock().await.risk;
        let started = Instant::now();

        let result = self.executor.execute_long_entry(&params).await;
        self.stats.lock().await.record_trade(&result);

        self.send_notification(Event::execution(ExecutionData {
            result: result.clone(),
            trigger,
            elapsed: started.elapsed(),
        }))
        .await;

        // The execution message already reports the failure itself, so only
        // a degradation or recovery adds another one.
        match &result {
            TradeResult::Filled(_) => self.record_success(COMPONENT_EXCHANGE).await,
            TradeResult::Failed(f) if f.kind == TradeErrorKind::Busy => {}
            TradeResult::Failed(f) => {
                self.escalate_failure(
                    COMPONENT_EXCHANGE,
                    &f.message,
                    f.credentials_rejected,
                    false,
                )
                .await;
            }
        }

        result
    }

    /// Checks the open position once and reports openings, warnings and
    /// closures.
    async fn check_position(&self) {
        let Some(monitor) = &self.monitor else {
            return;
        };

        let params = self.settings.lock().await.risk;
        let checked = monitor.lock().await.check_once(&params).await;

        let event = match checked {
            Ok(event) => {
                self.record_success(COMPONENT_MONITOR).await;
                event
            }
            Err(e) => {
                warn!(error = %e, "position check failed");
                self.record_failure(COMPONENT_MONITOR, &e.to_string(), is_fatal(&e))
                    .await;
                return;
            }
        };

        let data = match event {
            Some(MonitorEvent::Open(status)) if status.opened => PositionData::Opened(status),
            Some(MonitorEvent::Open(status)) if status.warning_changed && status.warning.is_some() => {
                PositionData::Warning(status)
            }
            Some(MonitorEvent::Closed(closed)) => PositionData::Closed(closed),
            _ => return,
        };

        self.send_notification(Event::position(data)).await;
    }

    /// Handles one inbound chat event. Returns the handle of a manual trade
    /// started by it, if any.
    pub(crate) async fn handle_chat_event(self: &Arc<Self>, event: ChatEvent) -> Option<JoinHandle<()>> {
        let chat = self.chat.as_ref()?;

        if let ChatInput::Button { callback_id, .. } = &event.input {
            if let Err(e) = chat.transport.answer_callback(callback_id).await {
                debug!(error = %e, "failed to answer callback");
            }
        }

        if event.chat_id != chat.chat_id {
            warn!(chat_id = %event.chat_id, "rejected message from unauthorized chat");
            self.send_chat(&event.chat_id, UNAUTHORIZED_REPLY, None).await;
            return None;
        }

        let input = match dialog_input(event.input) {
            Ok(input) => input,
            Err(e) => {
                debug!(error = %e, "ignoring unknown chat input");
                self.send_chat(&chat.chat_id, UNKNOWN_INPUT_REPLY, None).await;
                return None;
            }
        };

        let reply = {
            let mut dialog = self.dialog.lock().await;
            let mut settings = self.settings.lock().await;
            dialog
                .handle(input, &mut settings, self.store.as_ref())
                .await
        };

        self.send_chat(&chat.chat_id, &reply.text, reply.keyboard.as_ref())
            .await;

        match reply.action {
            Some(DialogAction::ExecuteTrade) => {
                info!(symbol = %self.executor.symbol(), "manual test trade requested");
                let bot = Arc::clone(self);
                Some(tokio::spawn(async move {
                    bot.run_trade(TradeTrigger::Manual).await;
                }))
            }
            Some(DialogAction::ShowStatus) => {
                let status = self.account_status().await;
                self.send_chat(&chat.chat_id, &status, None).await;
                None
            }
            None => None,
        }
    }

    async fn account_status(&self) -> String {
        let symbol = self.executor.symbol();
        let (balance, position) = tokio::join!(
            self.exchange.get_wallet_balance(BALANCE_ASSET),
            self.exchange.get_open_position(symbol),
        );

        format_account_status(
            symbol,
            balance.map_err(|e| e.to_string()),
            position.map_err(|e| e.to_string()),
        )
    }

    async fn send_chat(&self, chat_id: &str, text: &str, keyboard: Option<&Keyboard>) {
        let Some(chat) = &self.chat else {
            return;
        };
        if let Err(e) = chat.transport.send_message(chat_id, text, keyboard).await {
            warn!(chat_id = %chat_id, error = %e, "failed to send chat message");
        }
    }

    async fn record_success(&self, component: &str) {
        let change = self.health.lock().await.record_success(component);
        if let HealthChange::Recovered(data) = change {
            info!(component = %component, "component recovered");
            self.send_notification(Event::health(data)).await;
        }
    }

    /// Counts a failed run; the first failure of a streak is reported as an
    /// error, crossing the threshold as a degradation.
    async fn record_failure(&self, component: &str, message: &str, fatal: bool) {
        self.escalate_failure(component, message, fatal, true).await;
    }

    async fn escalate_failure(
        &self,
        component: &str,
        message: &str,
        fatal: bool,
        report_first_failure: bool,
    ) {
        let change = self
            .health
            .lock()
            .await
            .record_failure(component, message, fatal);

        match change {
            HealthChange::Degraded(data) => {
                error!(
                    component = %component,
                    failures = data.consecutive_failures,
                    error = %message,
                    "component degraded"
                );
                self.send_notification(Event::health(data)).await;
            }
            HealthChange::FirstFailure if report_first_failure => {
                self.send_notification(Event::error(ErrorData {
                    component: component.to_string(),
                    message: "run failed, retrying on schedule".to_string(),
                    error: Some(message.to_string()),
                }))
                .await;
            }
            HealthChange::FirstFailure
            | HealthChange::Unchanged
            | HealthChange::Recovered(_) => {}
        }
    }

    /// Sends a notification event; delivery failures are only logged.
    async fn send_notification(&self, event: Event) {
        if let Err(e) = self.notifier.send(&event).await {
            debug!(
                event_type = %event.event_type,
                error = %e,
                "Failed to send notification"
            );
        }
    }

    /// Sends a periodic overview notification with current stats.
    async fn send_overview(&self) {
        let stats = self.stats().await;
        let uptime = self.uptime().await;
        let degraded_components = self.health.lock().await.degraded_components();

        self.send_notification(Event::overview(OverviewData {
            uptime,
            polls: stats.polls,
            poll_failures: stats.poll_failures,
            announcements: stats.announcements,
            trades_attempted: stats.trades_attempted,
            successful_trades: stats.successful_trades,
            failed_trades: stats.failed_trades,
            degraded_fills: stats.degraded_fills,
            testnet: self.cfg.exchange.testnet,
            degraded_components,
        }))
        .await;
    }
}

fn dialog_input(input: ChatInput) -> Result<DialogInput, UnknownAction> {
    match input {
        ChatInput::Command(name) => name.parse().map(DialogInput::Command),
        ChatInput::Text(text) => Ok(DialogInput::Text(text)),
        ChatInput::Button { data, .. } => data.parse().map(DialogInput::Button),
    }
}

/// Rejected credentials will not fix themselves.
fn is_fatal(err: &ExchangeError) -> bool {
    matches!(err, ExchangeError::Authentication(_))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
