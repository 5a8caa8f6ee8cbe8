//! Telegram Bot API: outbound messages, callback answers and the inbound
//! long-polling listener.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::chat::{ChatEvent, ChatInput, ChatTransport, Keyboard};
use super::{Event, EventType, NotificationError, Notifier, format_event};
use crate::config::TelegramConfig;

const TELEGRAM_API_URL: &str = "https://api.telegram.org/bot";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_MESSAGE_LENGTH: usize = 4096;
const ASYNC_QUEUE_SIZE: usize = 100;
const INBOUND_QUEUE_SIZE: usize = 64;
const UPDATE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram Bot API client.
pub struct TelegramClient {
    http_client: reqwest::Client,
    api_url: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> Result<Self, NotificationError> {
        if bot_token.is_empty() {
            return Err(NotificationError::new("bot_token is required"));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::new(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_url: format!("{}{}", TELEGRAM_API_URL, bot_token),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &Value,
        timeout: Option<Duration>,
    ) -> Result<T, NotificationError> {
        let url = format!("{}/{}", self.api_url, method);

        let mut request = self.http_client.post(&url).json(payload);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::new(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| NotificationError::new(format!("Invalid Telegram response ({}): {}", status, e)))?;

        if !body.ok {
            return Err(NotificationError::new(format!(
                "Telegram API error: {} - {}",
                status,
                body.description.unwrap_or_else(|| "Unknown error".to_string())
            )));
        }

        body.result
            .ok_or_else(|| NotificationError::new(format!("Telegram {} returned no result", method)))
    }

    /// Long-polls for updates after `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        poll_timeout: Duration,
    ) -> Result<Vec<Update>, NotificationError> {
        let payload = json!({
            "offset": offset,
            "timeout": poll_timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });

        self.call("getUpdates", &payload, Some(poll_timeout + DEFAULT_HTTP_TIMEOUT))
            .await
    }
}

#[async_trait::async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), NotificationError> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": truncate(text, MAX_MESSAGE_LENGTH),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        if let Some(keyboard) = keyboard {
            let rows: Vec<Vec<Value>> = keyboard
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| json!({"text": b.text, "callback_data": b.callback_data}))
                        .collect()
                })
                .collect();
            payload["reply_markup"] = json!({ "inline_keyboard": rows });
        }

        let _: Value = self.call("sendMessage", &payload, None).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), NotificationError> {
        let payload = json!({ "callback_query_id": callback_id });
        let _: bool = self.call("answerCallbackQuery", &payload, None).await?;
        Ok(())
    }
}

/// Cuts `text` to at most `max` bytes on a character boundary.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    result: Option<T>,
}

/// Subset of a Telegram update the bot reads.
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    data: Option<String>,
    message: Option<Message>,
}

impl Update {
    /// Converts the update into a chat event; `None` for updates the bot
    /// does not handle (stickers, edits, ...).
    pub fn into_event(self) -> Option<ChatEvent> {
        if let Some(callback) = self.callback_query {
            let chat_id = callback.message?.chat.id.to_string();
            return Some(ChatEvent {
                chat_id,
                input: ChatInput::Button {
                    callback_id: callback.id,
                    data: callback.data.unwrap_or_default(),
                },
            });
        }

        let message = self.message?;
        let text = message.text?;
        Some(ChatEvent::from_message(message.chat.id.to_string(), &text))
    }
}

/// Polls getUpdates until `shutdown` flips and forwards chat events.
pub fn spawn_update_listener(
    client: Arc<TelegramClient>,
    poll_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> mpsc::Receiver<ChatEvent> {
    let (sender, receiver) = mpsc::channel(INBOUND_QUEUE_SIZE);

    tokio::spawn(async move {
        let mut offset = 0_i64;
        info!(poll_timeout = ?poll_timeout, "telegram update listener started");

        loop {
            let updates = tokio::select! {
                _ = shutdown.changed() => break,
                result = client.get_updates(offset, poll_timeout) => result,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        let Some(event) = update.into_event() else {
                            continue;
                        };
                        if sender.send(event).await.is_err() {
                            debug!("chat event receiver dropped, stopping listener");
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to fetch telegram updates");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(UPDATE_RETRY_DELAY) => {}
                    }
                }
            }
        }

        info!("telegram update listener stopped");
    });

    receiver
}

/// Work item for the delivery worker.
enum Delivery {
    /// Event to deliver; `reply` receives the outcome when the caller waits.
    Event {
        event: Event,
        reply: Option<oneshot::Sender<Result<(), NotificationError>>>,
    },
    /// Acknowledged once everything queued before it was delivered.
    Flush(oneshot::Sender<()>),
}

/// Telegram notifier: formats events and sends them to the operator chat.
///
/// Every event goes through a single delivery worker, so messages arrive in
/// the order they were sent or queued.
pub struct TelegramNotifier {
    config: TelegramConfig,
    queue: mpsc::Sender<Delivery>,
}

impl TelegramNotifier {
    /// Creates the notifier and spawns its delivery worker.
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        config: TelegramConfig,
    ) -> Result<Self, NotificationError> {
        if config.chat_id.is_empty() {
            return Err(NotificationError::new("chat_id is required"));
        }

        let (queue, receiver) = mpsc::channel(ASYNC_QUEUE_SIZE);
        Self::spawn_worker(receiver, transport, config.chat_id.clone());

        Ok(Self { config, queue })
    }

    fn spawn_worker(
        mut receiver: mpsc::Receiver<Delivery>,
        transport: Arc<dyn ChatTransport>,
        chat_id: String,
    ) {
        tokio::spawn(async move {
            while let Some(delivery) = receiver.recv().await {
                match delivery {
                    Delivery::Event { event, reply } => {
                        let text = format_event(&event);
                        let result = transport.send_message(&chat_id, &text, None).await;
                        match reply {
                            Some(reply) => {
                                let _ = reply.send(result);
                            }
                            None => {
                                if let Err(e) = result {
                                    error!(event_type = %event.event_type, error = %e, "Failed to send Telegram message");
                                }
                            }
                        }
                    }
                    Delivery::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            debug!("telegram delivery worker stopped");
        });
    }
}

fn worker_gone() -> NotificationError {
    NotificationError::new("telegram delivery worker stopped")
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        if !self.is_enabled(event.event_type) {
            return Ok(());
        }

        let (reply, outcome) = oneshot::channel();
        self.queue
            .send(Delivery::Event {
                event: event.clone(),
                reply: Some(reply),
            })
            .await
            .map_err(|_| worker_gone())?;

        outcome.await.map_err(|_| worker_gone())?
    }

    fn send_async(&self, event: Event) {
        if !self.is_enabled(event.event_type) {
            return;
        }

        let delivery = Delivery::Event { event, reply: None };
        if let Err(e) = self.queue.try_send(delivery) {
            error!(error = %e, "Failed to queue Telegram message");
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        match event_type {
            EventType::Startup
            | EventType::Shutdown
            | EventType::Execution
            | EventType::Health => true,
            EventType::Announcement => self.config.notify_announcements,
            EventType::Position => self.config.notify_positions,
            EventType::Error => self.config.notify_errors,
            EventType::Overview => self.config.notify_overview,
        }
    }

    async fn close(&self) -> Result<(), NotificationError> {
        let (ack, flushed) = oneshot::channel();
        self.queue
            .send(Delivery::Flush(ack))
            .await
            .map_err(|_| worker_gone())?;
        flushed.await.map_err(|_| worker_gone())
    }
}
