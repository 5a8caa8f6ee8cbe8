//! Two-way chat contract: outbound messages with inline keyboards, inbound
//! operator events.

use async_trait::async_trait;

use super::NotificationError;

/// A button of an inline keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Rows of buttons.
pub type Keyboard = Vec<Vec<InlineButton>>;

/// What the operator did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    /// A `/command`, name without the slash.
    Command(String),
    Text(String),
    /// An inline button press; `callback_id` must be answered.
    Button { callback_id: String, data: String },
}

/// An inbound event together with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub chat_id: String,
    pub input: ChatInput,
}

impl ChatEvent {
    /// Classifies a plain message.
    pub fn from_message(chat_id: impl Into<String>, text: &str) -> Self {
        let text = text.trim();
        let input = match text.strip_prefix('/') {
            Some(command) => {
                ChatInput::Command(command.split_whitespace().next().unwrap_or("").to_string())
            }
            None => ChatInput::Text(text.to_string()),
        };
        Self {
            chat_id: chat_id.into(),
            input,
        }
    }
}

/// ChatTransport sends messages to a chat and acknowledges button presses.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// SendMessage posts HTML `text`, optionally with an inline keyboard.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), NotificationError>;

    /// AnswerCallback stops the button's loading indicator.
    async fn answer_callback(&self, callback_id: &str) -> Result<(), NotificationError>;
}
