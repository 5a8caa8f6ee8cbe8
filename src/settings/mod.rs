//! Operator settings persisted between restarts: risk parameters and the
//! menu password digest.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::domain::RiskParameters;

/// Settings persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file is malformed: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("stored settings are invalid: {0}")]
    Invalid(String),
}

/// The live, operator-owned settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub risk: RiskParameters,
    /// SHA-256 hex digest of the menu password; `None` until one is set.
    pub password_sha256: Option<String>,
}

impl Settings {
    pub fn new(risk: RiskParameters) -> Self {
        Self {
            risk,
            password_sha256: None,
        }
    }

    pub fn has_password(&self) -> bool {
        self.password_sha256.is_some()
    }

    pub fn verify_password(&self, candidate: &str) -> bool {
        self.password_sha256
            .as_deref()
            .is_some_and(|stored| stored == hash_password(candidate))
    }

    /// Copy with the password replaced.
    pub fn with_password(&self, password: &str) -> Self {
        Self {
            risk: self.risk,
            password_sha256: Some(hash_password(password)),
        }
    }

    pub fn with_risk(&self, risk: RiskParameters) -> Self {
        Self {
            risk,
            password_sha256: self.password_sha256.clone(),
        }
    }
}

/// Hex-encoded SHA-256 of `password`.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// SettingsStore persists [`Settings`].
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load returns the stored settings, or `None` if nothing was saved yet.
    /// Missing risk fields are taken from `defaults`.
    async fn load(&self, defaults: &RiskParameters) -> Result<Option<Settings>, SettingsError>;

    /// Save replaces the stored settings. Readers see the old or the new
    /// document, never a partial one.
    async fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
}

/// Loads stored settings or falls back to `defaults`, then validates them.
pub async fn load_or_default(
    store: &dyn SettingsStore,
    defaults: RiskParameters,
    min_notional: Decimal,
) -> Result<Settings, SettingsError> {
    let settings = match store.load(&defaults).await? {
        Some(settings) => settings,
        None => {
            info!("no stored settings, using configured defaults");
            Settings::new(defaults)
        }
    };

    settings
        .risk
        .validate(min_notional)
        .map_err(|e| SettingsError::Invalid(e.to_string()))?;

    Ok(settings)
}

/// Flat on-disk document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quantity: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stop_loss_pct: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    take_profit_pct: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    leverage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password_sha256: Option<String>,
}

impl SettingsDocument {
    fn from_settings(settings: &Settings) -> Self {
        Self {
            quantity: Some(settings.risk.quantity),
            stop_loss_pct: Some(settings.risk.stop_loss_pct),
            take_profit_pct: Some(settings.risk.take_profit_pct),
            leverage: Some(settings.risk.leverage),
            password_sha256: settings.password_sha256.clone(),
        }
    }

    fn into_settings(self, defaults: &RiskParameters) -> Settings {
        Settings {
            risk: RiskParameters {
                quantity: self.quantity.unwrap_or(defaults.quantity),
                stop_loss_pct: self.stop_loss_pct.unwrap_or(defaults.stop_loss_pct),
                take_profit_pct: self.take_profit_pct.unwrap_or(defaults.take_profit_pct),
                leverage: self.leverage.unwrap_or(defaults.leverage),
            },
            password_sha256: self.password_sha256,
        }
    }
}

/// YAML file store with write-then-rename replacement.
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load(&self, defaults: &RiskParameters) -> Result<Option<Settings>, SettingsError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let document: SettingsDocument = serde_yaml::from_str(&content)?;
        debug!(path = %self.path.display(), "loaded settings");

        Ok(Some(document.into_settings(defaults)))
    }

    async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let content = serde_yaml::to_string(&SettingsDocument::from_settings(settings))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), "saved settings");
        Ok(())
    }
}
