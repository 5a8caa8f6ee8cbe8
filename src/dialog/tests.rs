//! Tests for the settings conversation.

use super::*;
use crate::domain::RiskParameters;
use crate::settings::{SettingsError, hash_password};
use async_trait::async_trait;
use std::sync::Mutex;

/// In-memory store that can be told to fail.
#[derive(Default)]
struct MemoryStore {
    saved: Mutex<Vec<Settings>>,
    fail: Mutex<bool>,
}

impl MemoryStore {
    fn failing() -> Self {
        let store = Self::default();
        *store.fail.lock().unwrap() = true;
        store
    }

    fn last(&self) -> Option<Settings> {
        self.saved.lock().unwrap().last().cloned()
    }

    fn saves(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load(&self, _defaults: &RiskParameters) -> Result<Option<Settings>, SettingsError> {
        Ok(self.last())
    }

    async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if *self.fail.lock().unwrap() {
            return Err(SettingsError::Io(std::io::Error::other("disk full")));
        }
        self.saved.lock().unwrap().push(settings.clone());
        Ok(())
    }
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn min_notional() -> Decimal {
    d("5")
}

fn fresh_settings() -> Settings {
    Settings::new(RiskParameters::default())
}

fn protected_settings() -> Settings {
    fresh_settings().with_password("secret")
}

fn text(s: &str) -> DialogInput {
    DialogInput::Text(s.to_string())
}

fn button(action: MenuAction) -> DialogInput {
    DialogInput::Button(action)
}

/// Dialog already logged in with the password "secret".
async fn logged_in(settings: &mut Settings, store: &MemoryStore) -> ConfigDialog {
    let mut dialog = ConfigDialog::new(settings, min_notional());
    dialog.handle(text("secret"), settings, store).await;
    assert_eq!(dialog.state(), DialogState::MainMenu);
    dialog
}

fn callbacks(keyboard: &Keyboard) -> Vec<String> {
    keyboard
        .iter()
        .flatten()
        .map(|b| b.callback_data.clone())
        .collect()
}

// ==================== Session start ====================

#[test]
fn test_initial_state_without_password() {
    let dialog = ConfigDialog::new(&fresh_settings(), min_notional());
    assert_eq!(dialog.state(), DialogState::AwaitingPasswordSetup);
    assert!(!dialog.is_authenticated());
}

#[test]
fn test_initial_state_with_password() {
    let dialog = ConfigDialog::new(&protected_settings(), min_notional());
    assert_eq!(dialog.state(), DialogState::AwaitingLogin);
}

// ==================== Password setup and login ====================

#[tokio::test]
async fn test_short_password_is_refused() {
    let store = MemoryStore::default();
    let mut settings = fresh_settings();
    let mut dialog = ConfigDialog::new(&settings, min_notional());

    let reply = dialog.handle(text("abc"), &mut settings, &store).await;

    assert_eq!(dialog.state(), DialogState::AwaitingPasswordSetup);
    assert!(reply.text.contains("at least 4"));
    assert!(!settings.has_password());
    assert_eq!(store.saves(), 0);
}

#[tokio::test]
async fn test_password_setup_persists_digest() {
    let store = MemoryStore::default();
    let mut settings = fresh_settings();
    let mut dialog = ConfigDialog::new(&settings, min_notional());

    let reply = dialog.handle(text("  s3cret "), &mut settings, &store).await;

    assert_eq!(dialog.state(), DialogState::MainMenu);
    assert!(reply.keyboard.is_some());
    assert!(settings.verify_password("s3cret"));
    assert_eq!(
        store.last().unwrap().password_sha256,
        Some(hash_password("s3cret"))
    );
}

#[tokio::test]
async fn test_password_setup_save_failure() {
    let store = MemoryStore::failing();
    let mut settings = fresh_settings();
    let mut dialog = ConfigDialog::new(&settings, min_notional());

    dialog.handle(text("s3cret"), &mut settings, &store).await;

    assert_eq!(dialog.state(), DialogState::AwaitingPasswordSetup);
    assert!(!settings.has_password());
}

#[tokio::test]
async fn test_wrong_password_stays_locked() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = ConfigDialog::new(&settings, min_notional());

    let reply = dialog.handle(text("guess"), &mut settings, &store).await;

    assert_eq!(dialog.state(), DialogState::AwaitingLogin);
    assert!(reply.text.contains("Wrong password"));
}

#[tokio::test]
async fn test_correct_password_opens_menu() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let dialog = logged_in(&mut settings, &store).await;

    assert!(dialog.is_authenticated());
    assert_eq!(store.saves(), 0);
}

// ==================== Editing ====================

#[tokio::test]
async fn test_non_numeric_quantity_keeps_editing() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = logged_in(&mut settings, &store).await;
    let before = settings.clone();

    dialog
        .handle(button(MenuAction::Edit(RiskField::Quantity)), &mut settings, &store)
        .await;
    assert_eq!(dialog.state(), DialogState::Editing(RiskField::Quantity));

    let reply = dialog.handle(text("ten"), &mut settings, &store).await;

    assert_eq!(dialog.state(), DialogState::Editing(RiskField::Quantity));
    assert_eq!(settings, before);
    assert_eq!(store.saves(), 0);
    assert!(reply.text.contains("not a number"));
    assert!(reply.text.contains("at least 5"));
}

#[tokio::test]
async fn test_valid_quantity_is_persisted() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = logged_in(&mut settings, &store).await;

    dialog
        .handle(button(MenuAction::Edit(RiskField::Quantity)), &mut settings, &store)
        .await;
    let reply = dialog.handle(text("7"), &mut settings, &store).await;

    assert_eq!(dialog.state(), DialogState::MainMenu);
    assert_eq!(settings.risk.quantity, d("7"));
    assert_eq!(store.last().unwrap().risk.quantity, d("7"));
    assert!(reply.text.contains("7 USDT"));
}

#[tokio::test]
async fn test_quantity_below_minimum() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = logged_in(&mut settings, &store).await;

    dialog
        .handle(button(MenuAction::Edit(RiskField::Quantity)), &mut settings, &store)
        .await;
    let reply = dialog.handle(text("2"), &mut settings, &store).await;

    assert_eq!(dialog.state(), DialogState::Editing(RiskField::Quantity));
    assert!(reply.text.contains("at least 5 USDT"));
}

#[tokio::test]
async fn test_stop_loss_out_of_range() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = logged_in(&mut settings, &store).await;

    dialog
        .handle(button(MenuAction::Edit(RiskField::StopLoss)), &mut settings, &store)
        .await;
    let reply = dialog.handle(text("150"), &mut settings, &store).await;

    assert_eq!(dialog.state(), DialogState::Editing(RiskField::StopLoss));
    assert!(reply.text.contains("between 0 and 100"));
    assert_eq!(settings.risk.stop_loss_pct, RiskParameters::default().stop_loss_pct);
}

#[tokio::test]
async fn test_fractional_leverage_names_constraint() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = logged_in(&mut settings, &store).await;

    dialog
        .handle(button(MenuAction::Edit(RiskField::Leverage)), &mut settings, &store)
        .await;
    let reply = dialog.handle(text("2.5"), &mut settings, &store).await;

    assert_eq!(dialog.state(), DialogState::Editing(RiskField::Leverage));
    assert!(reply.text.contains("not a whole number"));

    dialog.handle(text("10x"), &mut settings, &store).await;
    assert_eq!(settings.risk.leverage, 10);
    assert_eq!(dialog.state(), DialogState::MainMenu);
}

#[tokio::test]
async fn test_save_failure_keeps_old_value() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = logged_in(&mut settings, &store).await;

    dialog
        .handle(button(MenuAction::Edit(RiskField::TakeProfit)), &mut settings, &store)
        .await;
    *store.fail.lock().unwrap() = true;
    let reply = dialog.handle(text("8"), &mut settings, &store).await;

    assert_eq!(dialog.state(), DialogState::Editing(RiskField::TakeProfit));
    assert_eq!(settings.risk.take_profit_pct, RiskParameters::default().take_profit_pct);
    assert!(reply.text.contains("Could not save"));
}

#[tokio::test]
async fn test_cancel_leaves_editing() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = logged_in(&mut settings, &store).await;

    dialog
        .handle(button(MenuAction::Edit(RiskField::StopLoss)), &mut settings, &store)
        .await;
    dialog
        .handle(DialogInput::Command(Command::Cancel), &mut settings, &store)
        .await;
    assert_eq!(dialog.state(), DialogState::MainMenu);

    dialog
        .handle(button(MenuAction::Edit(RiskField::StopLoss)), &mut settings, &store)
        .await;
    dialog.handle(button(MenuAction::BackMain), &mut settings, &store).await;
    assert_eq!(dialog.state(), DialogState::MainMenu);
    assert_eq!(store.saves(), 0);
}

// ==================== Menu actions ====================

#[tokio::test]
async fn test_unauthenticated_trade_is_rejected() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = ConfigDialog::new(&settings, min_notional());

    let reply = dialog
        .handle(button(MenuAction::TestTrade), &mut settings, &store)
        .await;

    assert_eq!(reply.action, None);
    assert_eq!(dialog.state(), DialogState::AwaitingLogin);
    assert!(reply.text.contains("log in"));
}

#[tokio::test]
async fn test_unauthenticated_settings_view_is_rejected() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = ConfigDialog::new(&settings, min_notional());

    let reply = dialog
        .handle(button(MenuAction::ShowSettings), &mut settings, &store)
        .await;

    assert_eq!(dialog.state(), DialogState::AwaitingLogin);
    assert!(!reply.text.contains("Quantity"));
}

#[tokio::test]
async fn test_unauthenticated_without_password_goes_to_setup() {
    let store = MemoryStore::default();
    let mut settings = fresh_settings();
    let mut dialog = ConfigDialog::new(&settings, min_notional());

    dialog
        .handle(button(MenuAction::Edit(RiskField::Quantity)), &mut settings, &store)
        .await;

    assert_eq!(dialog.state(), DialogState::AwaitingPasswordSetup);
}

#[tokio::test]
async fn test_logout_locks_menu() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = logged_in(&mut settings, &store).await;

    dialog
        .handle(DialogInput::Command(Command::Logout), &mut settings, &store)
        .await;
    assert_eq!(dialog.state(), DialogState::AwaitingLogin);

    dialog
        .handle(button(MenuAction::Edit(RiskField::Quantity)), &mut settings, &store)
        .await;
    assert_eq!(dialog.state(), DialogState::AwaitingLogin);
}

#[tokio::test]
async fn test_logout_while_editing() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = logged_in(&mut settings, &store).await;

    dialog
        .handle(button(MenuAction::Edit(RiskField::Quantity)), &mut settings, &store)
        .await;
    dialog.handle(button(MenuAction::Logout), &mut settings, &store).await;

    // The number is now taken as a (wrong) password, not as a quantity.
    dialog.handle(text("7"), &mut settings, &store).await;
    assert_eq!(dialog.state(), DialogState::AwaitingLogin);
    assert_eq!(settings.risk.quantity, RiskParameters::default().quantity);
}

#[tokio::test]
async fn test_trade_and_status_actions() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = logged_in(&mut settings, &store).await;

    let reply = dialog
        .handle(button(MenuAction::TestTrade), &mut settings, &store)
        .await;
    assert_eq!(reply.action, Some(DialogAction::ExecuteTrade));

    let reply = dialog
        .handle(button(MenuAction::Status), &mut settings, &store)
        .await;
    assert_eq!(reply.action, Some(DialogAction::ShowStatus));
    assert_eq!(dialog.state(), DialogState::MainMenu);
}

#[tokio::test]
async fn test_settings_view_lists_all_fields() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = logged_in(&mut settings, &store).await;

    let reply = dialog
        .handle(button(MenuAction::Settings), &mut settings, &store)
        .await;

    for field in RiskField::ALL {
        assert!(reply.text.contains(field.label()));
    }
    let data = callbacks(reply.keyboard.as_ref().unwrap());
    assert!(data.contains(&"set_quantity".to_string()));
    assert!(data.contains(&"back_main".to_string()));
}

#[tokio::test]
async fn test_start_command_shows_prompt_or_menu() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = ConfigDialog::new(&settings, min_notional());

    let reply = dialog
        .handle(DialogInput::Command(Command::Start), &mut settings, &store)
        .await;
    assert!(reply.text.contains("password"));
    assert!(reply.keyboard.is_none());

    dialog.handle(text("secret"), &mut settings, &store).await;
    let reply = dialog
        .handle(DialogInput::Command(Command::Start), &mut settings, &store)
        .await;
    assert!(reply.keyboard.is_some());
}

#[tokio::test]
async fn test_validation_message_is_escaped() {
    let store = MemoryStore::default();
    let mut settings = protected_settings();
    let mut dialog = logged_in(&mut settings, &store).await;

    dialog
        .handle(button(MenuAction::Edit(RiskField::Quantity)), &mut settings, &store)
        .await;
    let reply = dialog.handle(text("<b>"), &mut settings, &store).await;

    assert!(reply.text.contains("&lt;b&gt;"));
}

// ==================== Parsing ====================

#[test]
fn test_menu_action_callback_round_trip() {
    let actions = [
        MenuAction::Settings,
        MenuAction::TestTrade,
        MenuAction::ShowSettings,
        MenuAction::Status,
        MenuAction::Edit(RiskField::Quantity),
        MenuAction::Edit(RiskField::StopLoss),
        MenuAction::Edit(RiskField::TakeProfit),
        MenuAction::Edit(RiskField::Leverage),
        MenuAction::BackMain,
        MenuAction::Logout,
    ];
    for action in actions {
        assert_eq!(MenuAction::from_str(action.callback_data()), Ok(action));
    }
}

#[test]
fn test_unknown_callback() {
    assert_eq!(
        MenuAction::from_str("set_min_value"),
        Err(UnknownAction("set_min_value".to_string()))
    );
}

#[test]
fn test_command_parsing() {
    assert_eq!(Command::from_str("/start"), Ok(Command::Start));
    assert_eq!(Command::from_str("/logout@sniper_bot"), Ok(Command::Logout));
    assert!(Command::from_str("/help").is_err());
}
