//! Password-gated settings conversation with the operator.
//!
//! One [`ConfigDialog`] exists per authorized chat. It owns no settings: the
//! caller passes the live [`Settings`] and the store on every input, and the
//! dialog replaces them only after the store accepted the new document.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::RiskField;
use crate::notification::{InlineButton, Keyboard, escape_html};
use crate::settings::{Settings, SettingsStore};

/// Shortest accepted menu password, in characters.
pub const MIN_PASSWORD_LEN: usize = 4;

/// Where the conversation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    AwaitingPasswordSetup,
    AwaitingLogin,
    MainMenu,
    Editing(RiskField),
}

impl DialogState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, DialogState::MainMenu | DialogState::Editing(_))
    }
}

/// Inline menu buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Settings,
    TestTrade,
    ShowSettings,
    Status,
    Edit(RiskField),
    BackMain,
    Logout,
}

impl MenuAction {
    /// Callback payload carried by the button.
    pub fn callback_data(&self) -> &'static str {
        match self {
            MenuAction::Settings => "settings",
            MenuAction::TestTrade => "test_announcement",
            MenuAction::ShowSettings => "show_settings",
            MenuAction::Status => "status",
            MenuAction::Edit(RiskField::Quantity) => "set_quantity",
            MenuAction::Edit(RiskField::StopLoss) => "set_sl",
            MenuAction::Edit(RiskField::TakeProfit) => "set_tp",
            MenuAction::Edit(RiskField::Leverage) => "set_leverage",
            MenuAction::BackMain => "back_main",
            MenuAction::Logout => "logout",
        }
    }

    fn button(self, label: &str) -> InlineButton {
        InlineButton::new(label, self.callback_data())
    }
}

/// Callback payload that names no menu action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown menu action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for MenuAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "settings" => Ok(MenuAction::Settings),
            "test_announcement" => Ok(MenuAction::TestTrade),
            "show_settings" => Ok(MenuAction::ShowSettings),
            "status" => Ok(MenuAction::Status),
            "set_quantity" => Ok(MenuAction::Edit(RiskField::Quantity)),
            "set_sl" => Ok(MenuAction::Edit(RiskField::StopLoss)),
            "set_tp" => Ok(MenuAction::Edit(RiskField::TakeProfit)),
            "set_leverage" => Ok(MenuAction::Edit(RiskField::Leverage)),
            "back_main" => Ok(MenuAction::BackMain),
            "logout" => Ok(MenuAction::Logout),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Slash commands understood by the dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Settings,
    Logout,
    Cancel,
}

impl FromStr for Command {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "/start@my_bot" in group chats
        let name = s.trim_start_matches('/');
        let name = name.split('@').next().unwrap_or(name);
        match name {
            "start" | "menu" => Ok(Command::Start),
            "settings" => Ok(Command::Settings),
            "logout" => Ok(Command::Logout),
            "cancel" => Ok(Command::Cancel),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// One operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogInput {
    Command(Command),
    Text(String),
    Button(MenuAction),
}

/// Work the dialog asks the caller to do after replying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogAction {
    ExecuteTrade,
    ShowStatus,
}

/// Message to send back to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// HTML text.
    pub text: String,
    pub keyboard: Option<Keyboard>,
    pub action: Option<DialogAction>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
            action: None,
        }
    }

    fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    fn with_action(mut self, action: DialogAction) -> Self {
        self.action = Some(action);
        self
    }
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogState::AwaitingPasswordSetup => write!(f, "awaiting_password_setup"),
            DialogState::AwaitingLogin => write!(f, "awaiting_login"),
            DialogState::MainMenu => write!(f, "main_menu"),
            DialogState::Editing(field) => write!(f, "editing({})", field),
        }
    }
}

/// The settings conversation state machine.
pub struct ConfigDialog {
    state: DialogState,
    min_notional: Decimal,
}

impl ConfigDialog {
    /// Starts a session: password setup if none is stored, login otherwise.
    pub fn new(settings: &Settings, min_notional: Decimal) -> Self {
        Self {
            state: Self::locked_state(settings),
            min_notional,
        }
    }

    pub fn state(&self) -> DialogState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    /// Applies one input. `settings` changes only when `store.save` succeeded.
    pub async fn handle(
        &mut self,
        input: DialogInput,
        settings: &mut Settings,
        store: &dyn SettingsStore,
    ) -> Reply {
        let before = self.state;
        let reply = match input {
            DialogInput::Command(command) => self.on_command(command, settings),
            DialogInput::Text(text) => self.on_text(text.trim(), settings, store).await,
            DialogInput::Button(action) => self.on_button(action, settings),
        };

        if before != self.state {
            info!(from = %before, to = %self.state, "dialog state changed");
        }
        reply
    }

    fn on_command(&mut self, command: Command, settings: &Settings) -> Reply {
        match command {
            Command::Logout => self.on_button(MenuAction::Logout, settings),
            Command::Settings => self.on_button(MenuAction::Settings, settings),
            Command::Start | Command::Cancel => {
                if !self.is_authenticated() {
                    return self.prompt_credentials(settings);
                }
                let cancelled = matches!(self.state, DialogState::Editing(_));
                self.state = DialogState::MainMenu;
                if cancelled {
                    Reply::text("Edit cancelled.").with_keyboard(main_menu())
                } else {
                    self.main_menu_reply()
                }
            }
        }
    }

    async fn on_text(
        &mut self,
        text: &str,
        settings: &mut Settings,
        store: &dyn SettingsStore,
    ) -> Reply {
        match self.state {
            DialogState::AwaitingPasswordSetup => {
                if text.chars().count() < MIN_PASSWORD_LEN {
                    return Reply::text(format!(
                        "❌ Password must be at least {} characters. Try again:",
                        MIN_PASSWORD_LEN
                    ));
                }
                let candidate = settings.with_password(text);
                if let Err(e) = store.save(&candidate).await {
                    warn!(error = %e, "failed to persist password");
                    return Reply::text(format!(
                        "⚠️ Could not save the password: {}\nTry again:",
                        escape_html(&e.to_string())
                    ));
                }
                *settings = candidate;
                self.state = DialogState::MainMenu;
                Reply::text("✅ Password set. You are logged in.").with_keyboard(main_menu())
            }
            DialogState::AwaitingLogin => {
                if !settings.verify_password(text) {
                    warn!("menu login failed");
                    return Reply::text("❌ Wrong password. Try again:");
                }
                self.state = DialogState::MainMenu;
                self.main_menu_reply()
            }
            DialogState::MainMenu => self.main_menu_reply(),
            DialogState::Editing(field) => self.on_value(field, text, settings, store).await,
        }
    }

    async fn on_value(
        &mut self,
        field: RiskField,
        text: &str,
        settings: &mut Settings,
        store: &dyn SettingsStore,
    ) -> Reply {
        let risk = match settings.risk.with_field(field, text, self.min_notional) {
            Ok(risk) => risk,
            Err(e) => {
                return Reply::text(format!(
                    "❌ {}\nEnter {} ({}):",
                    escape_html(&e.to_string()),
                    field.label(),
                    field.constraint(self.min_notional)
                ))
                .with_keyboard(cancel_menu());
            }
        };

        let candidate = settings.with_risk(risk);
        if let Err(e) = store.save(&candidate).await {
            warn!(field = %field, error = %e, "failed to persist settings, keeping old value");
            return Reply::text(format!(
                "⚠️ Could not save {}: {}\nThe old value is still active. Try again:",
                field.label(),
                escape_html(&e.to_string())
            ))
            .with_keyboard(cancel_menu());
        }

        *settings = candidate;
        self.state = DialogState::MainMenu;
        info!(field = %field, value = %settings.risk.display_value(field), "setting updated");

        Reply::text(format!(
            "✅ {} updated to <b>{}</b>",
            field.label(),
            settings.risk.display_value(field)
        ))
        .with_keyboard(settings_menu())
    }

    fn on_button(&mut self, action: MenuAction, settings: &Settings) -> Reply {
        if !self.is_authenticated() {
            warn!(action = action.callback_data(), "menu action without login");
            self.state = Self::locked_state(settings);
            let mut reply = self.prompt_credentials(settings);
            reply.text = format!("🔒 Please log in first.\n{}", reply.text);
            return reply;
        }

        match action {
            MenuAction::Logout => {
                self.state = Self::locked_state(settings);
                Reply::text("👋 Logged out. Send the password to log in again.")
            }
            MenuAction::Settings => {
                self.state = DialogState::MainMenu;
                Reply::text(format!(
                    "⚙️ <b>Settings</b>\n\n{}\n\nChoose a value to change:",
                    settings_summary(settings)
                ))
                .with_keyboard(settings_menu())
            }
            MenuAction::ShowSettings => {
                Reply::text(format!(
                    "📊 <b>Current Settings</b>\n\n{}",
                    settings_summary(settings)
                ))
                .with_keyboard(main_menu())
            }
            MenuAction::TestTrade => Reply::text("🚀 Running test trade...")
                .with_action(DialogAction::ExecuteTrade),
            MenuAction::Status => {
                Reply::text("🔎 Fetching account status...").with_action(DialogAction::ShowStatus)
            }
            MenuAction::Edit(field) => {
                self.state = DialogState::Editing(field);
                Reply::text(format!(
                    "Current {}: <b>{}</b>\nEnter new value ({}):",
                    field.label(),
                    settings.risk.display_value(field),
                    field.constraint(self.min_notional)
                ))
                .with_keyboard(cancel_menu())
            }
            MenuAction::BackMain => {
                self.state = DialogState::MainMenu;
                self.main_menu_reply()
            }
        }
    }

    fn prompt_credentials(&self, settings: &Settings) -> Reply {
        if settings.has_password() {
            Reply::text("🔑 Enter the password:")
        } else {
            Reply::text(format!(
                "🔐 No password set yet. Choose one (at least {} characters):",
                MIN_PASSWORD_LEN
            ))
        }
    }

    fn main_menu_reply(&self) -> Reply {
        Reply::text("🤖 <b>Main Menu</b>").with_keyboard(main_menu())
    }

    fn locked_state(settings: &Settings) -> DialogState {
        if settings.has_password() {
            DialogState::AwaitingLogin
        } else {
            DialogState::AwaitingPasswordSetup
        }
    }
}

fn settings_summary(settings: &Settings) -> String {
    RiskField::ALL
        .iter()
        .map(|field| format!("{}: <b>{}</b>", field.label(), settings.risk.display_value(*field)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn main_menu() -> Keyboard {
    vec![
        vec![
            MenuAction::Settings.button("⚙️ Settings"),
            MenuAction::TestTrade.button("🚀 Test Announcement"),
        ],
        vec![
            MenuAction::ShowSettings.button("📊 Current Settings"),
            MenuAction::Status.button("💼 Status"),
        ],
        vec![MenuAction::Logout.button("🚪 Logout")],
    ]
}

fn settings_menu() -> Keyboard {
    vec![
        vec![
            MenuAction::Edit(RiskField::Quantity).button("📈 Quantity"),
            MenuAction::Edit(RiskField::Leverage).button("⚡️ Leverage"),
        ],
        vec![
            MenuAction::Edit(RiskField::StopLoss).button("🔻 Stop Loss"),
            MenuAction::Edit(RiskField::TakeProfit).button("🔼 Take Profit"),
        ],
        vec![MenuAction::BackMain.button("🔙 Back")],
    ]
}

fn cancel_menu() -> Keyboard {
    vec![vec![MenuAction::BackMain.button("🔙 Cancel")]]
}

#[cfg(test)]
mod tests;
