//! Declared commands, their aliases, and their mutable runtime state.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use cmdbridge_common::Error;
use cmdbridge_common::models::{
    CommandDeclaration, CommandRuntimeState, CommandSettings, ParamKind, is_valid_cooldown,
};

#[derive(Debug, Default)]
pub struct CommandRegistry {
    /// Declaration order, used for listings.
    order: Vec<String>,
    declarations: HashMap<String, CommandDeclaration>,
    aliases: HashMap<String, String>,
    runtime: HashMap<String, CommandRuntimeState>,
}

impl CommandRegistry {
    /// Indexes `declarations`. Fails on any name/alias collision or on a
    /// parameter list that puts the sender anywhere but first.
    pub fn build(declarations: Vec<CommandDeclaration>) -> Result<Self, Error> {
        let mut registry = CommandRegistry::default();

        for decl in &declarations {
            if decl.name.is_empty() || decl.name.chars().any(char::is_whitespace) {
                return Err(Error::InvalidDeclaration {
                    command: decl.name.clone(),
                    reason: "name must be a single non-empty word".into(),
                });
            }
            if !is_valid_cooldown(decl.default_cooldown_secs) {
                return Err(Error::InvalidDeclaration {
                    command: decl.name.clone(),
                    reason: format!("cooldown of {}s is out of range", decl.default_cooldown_secs),
                });
            }
            if decl.params.iter().skip(1).any(|p| *p == ParamKind::User) {
                return Err(Error::InvalidDeclaration {
                    command: decl.name.clone(),
                    reason: "the user parameter may only come first".into(),
                });
            }
            if registry.declarations.contains_key(&decl.name) {
                return Err(Error::DuplicateCommandName(decl.name.clone()));
            }
            registry.order.push(decl.name.clone());
            registry.runtime.insert(decl.name.clone(), CommandRuntimeState::from_declaration(decl));
            registry.declarations.insert(decl.name.clone(), decl.clone());
        }

        for decl in &declarations {
            for alias in &decl.aliases {
                if registry.declarations.contains_key(alias) || registry.aliases.contains_key(alias) {
                    return Err(Error::DuplicateCommandName(alias.clone()));
                }
                registry.aliases.insert(alias.clone(), decl.name.clone());
            }
        }

        info!(
            "Command registry built: {} commands, {} aliases",
            registry.declarations.len(),
            registry.aliases.len()
        );
        Ok(registry)
    }

    /// Builds the registry and reconciles it with persisted per-command settings.
    pub fn build_with_settings(
        declarations: Vec<CommandDeclaration>,
        persisted: &[CommandSettings],
    ) -> Result<Self, Error> {
        let mut registry = Self::build(declarations)?;
        registry.apply_settings(persisted);
        Ok(registry)
    }

    /// Overrides runtime state from persisted settings. Entries for commands
    /// that are no longer declared are ignored.
    pub fn apply_settings(&mut self, persisted: &[CommandSettings]) {
        for s in persisted {
            match self.runtime.get_mut(&s.name) {
                Some(state) => {
                    state.enabled = s.enabled;
                    if is_valid_cooldown(s.cooldown_secs) {
                        state.cooldown_secs = s.cooldown_secs;
                    } else {
                        warn!(
                            "Ignoring cooldown of {}s for '{}', keeping {}s",
                            s.cooldown_secs, s.name, state.cooldown_secs
                        );
                    }
                }
                None => debug!("Dropping settings for undeclared command '{}'", s.name),
            }
        }
    }

    /// The reconciled per-command settings, in declaration order.
    pub fn command_settings(&self) -> Vec<CommandSettings> {
        self.order
            .iter()
            .filter_map(|name| self.runtime.get(name))
            .map(|s| CommandSettings {
                name: s.name.clone(),
                enabled: s.enabled,
                cooldown_secs: s.cooldown_secs,
            })
            .collect()
    }

    /// Alias first, then direct name.
    pub fn resolve(&self, token: &str) -> Option<&str> {
        if let Some(name) = self.aliases.get(token) {
            return Some(name.as_str());
        }
        self.declarations.get_key_value(token).map(|(k, _)| k.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&CommandDeclaration> {
        self.declarations.get(name)
    }

    pub fn runtime_state(&self, name: &str) -> Option<&CommandRuntimeState> {
        self.runtime.get(name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.runtime.get(name).is_some_and(|s| s.enabled)
    }

    pub fn cooldown_of(&self, name: &str) -> Duration {
        self.runtime
            .get(name)
            .map(CommandRuntimeState::cooldown)
            .unwrap_or(Duration::ZERO)
    }

    /// Returns false if `name` is not declared.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.runtime.get_mut(name) {
            Some(s) => {
                s.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Returns false if `name` is not declared or `secs` is out of range.
    pub fn set_cooldown(&mut self, name: &str, secs: f64) -> bool {
        if !is_valid_cooldown(secs) {
            return false;
        }
        match self.runtime.get_mut(name) {
            Some(s) => {
                s.cooldown_secs = secs;
                true
            }
            None => false,
        }
    }

    /// Every enabled command, in declaration order.
    pub fn available_commands(&self) -> Vec<CommandRuntimeState> {
        self.order
            .iter()
            .filter_map(|name| self.runtime.get(name))
            .filter(|s| s.enabled)
            .cloned()
            .collect()
    }

    pub fn declarations(&self) -> impl Iterator<Item = &CommandDeclaration> {
        self.order.iter().filter_map(|name| self.declarations.get(name))
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}
