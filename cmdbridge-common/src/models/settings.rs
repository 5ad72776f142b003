use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Error;
use crate::models::command::{CommandMode, MAX_COOLDOWN_SECS, is_valid_cooldown};

/// Persisted per-command override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSettings {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub cooldown_secs: f64,
}

/// Credentials cached by the authentication flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedAuth {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub channel_name: String,
}

/// Everything the chat client reads from its settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub client_id: String,
    pub command_prefix: String,
    pub redirect_uri: String,
    pub commands_mode: CommandMode,
    pub debug_mode: bool,
    pub initialize_on_start: bool,
    pub server_addr: String,
    pub connect_timeout_secs: u64,
    pub tick_interval_ms: u64,
    pub commands: Vec<CommandSettings>,
    pub auth: CachedAuth,
}

fn default_true() -> bool {
    true
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            command_prefix: "!".to_string(),
            redirect_uri: "http://localhost".to_string(),
            commands_mode: CommandMode::Disabled,
            debug_mode: true,
            initialize_on_start: true,
            server_addr: "irc.chat.twitch.tv:6667".to_string(),
            connect_timeout_secs: 10,
            tick_interval_ms: 20,
            commands: Vec::new(),
            auth: CachedAuth::default(),
        }
    }
}

impl ChatSettings {
    /// Reads settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            info!("No settings at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let settings: ChatSettings = serde_json::from_str(&raw)?;
        settings.validate()?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.command_prefix.is_empty() {
            return Err(Error::Config("command_prefix must not be empty".into()));
        }
        if self.command_prefix.chars().any(char::is_whitespace) {
            return Err(Error::Config("command_prefix must not contain whitespace".into()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::Config("connect_timeout_secs must be positive".into()));
        }
        if let Some(bad) = self.commands.iter().find(|c| !is_valid_cooldown(c.cooldown_secs)) {
            return Err(Error::Config(format!(
                "cooldown_secs of '{}' must be between 0 and {}, got {}",
                bad.name, MAX_COOLDOWN_SECS, bad.cooldown_secs
            )));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}
