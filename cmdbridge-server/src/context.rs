//! cmdbridge-server/src/context.rs
//!
//! Settings and shared handles for one server run.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use cmdbridge_common::models::ChatSettings;
use cmdbridge_core::Error;
use cmdbridge_core::eventbus::EventBus;

use crate::Args;

pub struct ServerContext {
    pub settings: ChatSettings,
    pub settings_path: PathBuf,
    /// False when the file was missing and defaults were used.
    pub from_file: bool,
    pub event_bus: EventBus,
}

impl ServerContext {
    pub fn load(args: &Args) -> Result<Self, Error> {
        let settings_path = match &args.settings {
            Some(p) => p.clone(),
            None => default_settings_path()?,
        };

        let from_file = settings_path.exists();
        let mut settings = ChatSettings::load(&settings_path)?;
        apply_overrides(&mut settings, args);
        settings.validate()?;

        Ok(Self {
            settings,
            settings_path,
            from_file,
            event_bus: EventBus::new(),
        })
    }

    /// Loading happens before logging is up, so the outcome is reported here
    /// once the subscriber is installed.
    pub fn log_loaded(&self) {
        if self.from_file {
            info!("Loaded settings from {}", self.settings_path.display());
        } else {
            info!("No settings at {}; using defaults", self.settings_path.display());
        }
        debug!(
            "server={} prefix='{}' mode={:?} commands={}",
            self.settings.server_addr,
            self.settings.command_prefix,
            self.settings.commands_mode,
            self.settings.commands.len()
        );
    }

    /// Writes the settings back, e.g. after the command list was reconciled.
    pub fn persist(&self) -> Result<(), Error> {
        self.settings.save(&self.settings_path)
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }
}

fn default_settings_path() -> Result<PathBuf, Error> {
    let base = dirs::config_dir()
        .ok_or_else(|| Error::Config("no config directory on this platform".into()))?;
    Ok(base.join("cmdbridge").join("settings.json"))
}

/// CLI flags and `CMDBRIDGE_*` variables beat the file.
fn apply_overrides(settings: &mut ChatSettings, args: &Args) {
    if let Some(addr) = &args.server_addr {
        settings.server_addr = addr.clone();
    }
    if args.debug {
        settings.debug_mode = true;
    }
    if let Some(token) = &args.token {
        settings.auth.token = Some(token.clone());
    }
    if let Some(username) = &args.username {
        settings.auth.username = username.clone();
    }
    if let Some(channel) = &args.channel {
        settings.auth.channel_name = channel.clone();
    }
}
