use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::time::Instant;
use tracing::{debug, error, info};

use cmdbridge_common::Error;
use cmdbridge_common::models::{ChatUser, CommandInvocation, CommandMode};
use cmdbridge_common::traits::CommandHandler;

use crate::eventbus::EventBus;
use crate::services::arguments::bind_arguments;
use crate::services::command_registry::CommandRegistry;
use crate::services::cooldown::CooldownTracker;
use crate::services::handler_bindings::HandlerBindings;

/// What a dispatch attempt did. Argument errors are returned as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The token is neither a command nor an alias.
    Unknown,
    Disabled,
    OnCooldown,
    /// Handlers ran; `failures` of them returned an error or panicked.
    Invoked { handlers: usize, failures: usize },
}

/// Splits `body` into a command token and its whitespace-separated
/// arguments. None if the body does not start with `prefix` or the token is
/// empty.
pub fn parse_command_line<'a>(prefix: &str, body: &'a str) -> Option<(&'a str, Vec<&'a str>)> {
    let rest = body.trim_start().strip_prefix(prefix)?;
    // "! join" is not a command
    if rest.starts_with(char::is_whitespace) {
        return None;
    }
    let mut words = rest.split_whitespace();
    let token = words.next()?;
    Some((token, words.collect()))
}

/// Routes chat commands to their bound handlers.
pub struct Dispatcher {
    prefix: String,
    registry: CommandRegistry,
    bindings: HandlerBindings,
    cooldowns: CooldownTracker,
    bus: EventBus,
}

impl Dispatcher {
    pub fn new(registry: CommandRegistry, mode: CommandMode, prefix: &str, bus: EventBus) -> Self {
        debug!("Initializing Dispatcher with prefix '{}' and mode {:?}", prefix, mode);
        let mut bindings = HandlerBindings::new();
        bindings.attach(&registry);
        Self {
            prefix: prefix.to_string(),
            registry,
            bindings,
            cooldowns: CooldownTracker::new(mode),
            bus,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    /// Swaps in a freshly built registry. Bindings whose command vanished or
    /// changed host type are dropped, and running cooldowns are forgotten.
    pub fn replace_registry(&mut self, registry: CommandRegistry) {
        self.bindings.attach(&registry);
        self.registry = registry;
        self.cooldowns.clear();
    }

    pub fn bindings(&self) -> &HandlerBindings {
        &self.bindings
    }

    pub fn register_handler(&mut self, handler: Arc<dyn CommandHandler>, host_type: &str) -> usize {
        self.bindings.register(handler, host_type)
    }

    pub fn unregister_handler(&mut self, handler: &Arc<dyn CommandHandler>, host_type: &str) -> usize {
        self.bindings.unregister(handler, host_type)
    }

    /// Toggles a command; disabling it also ends any running cooldown.
    /// False if `name` is not declared.
    pub fn set_command_enabled(&mut self, name: &str, enabled: bool) -> bool {
        if !self.registry.set_enabled(name, enabled) {
            return false;
        }
        if !enabled {
            self.cooldowns.cancel(name);
        }
        true
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    pub fn set_mode(&mut self, mode: CommandMode) {
        self.cooldowns.set_mode(mode);
    }

    /// Releases expired cooldowns.
    pub fn on_tick(&mut self, now: Instant) {
        self.cooldowns.release_expired(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.cooldowns.next_deadline()
    }

    /// Drops every running cooldown; called when the session is torn down.
    pub fn reset(&mut self) {
        self.cooldowns.clear();
    }

    /// Dispatches `body` if it is a prefixed command. Ok(None) for ordinary chat.
    pub async fn handle_message(
        &mut self,
        user: &Arc<ChatUser>,
        body: &str,
        now: Instant,
    ) -> Result<Option<DispatchOutcome>, Error> {
        let Some((token, args)) = parse_command_line(&self.prefix, body) else {
            return Ok(None);
        };
        self.dispatch(token, user, &args, now).await.map(Some)
    }

    pub async fn dispatch(
        &mut self,
        token: &str,
        user: &Arc<ChatUser>,
        args: &[&str],
        now: Instant,
    ) -> Result<DispatchOutcome, Error> {
        // 1) resolve alias
        let Some(name) = self.registry.resolve(token).map(str::to_string) else {
            debug!("Ignoring unknown command '{}'", token);
            return Ok(DispatchOutcome::Unknown);
        };

        // 2) enabled?
        if !self.registry.is_enabled(&name) {
            debug!("Command '{}' is disabled", name);
            return Ok(DispatchOutcome::Disabled);
        }

        // 3) cooldown
        if self.cooldowns.mode() == CommandMode::Cooldown {
            let duration = self.registry.cooldown_of(&name);
            if !self.cooldowns.try_start(&name, duration, now) {
                debug!("Command '{}' is on cooldown", name);
                return Ok(DispatchOutcome::OnCooldown);
            }
        }

        // 4-6) bind sender, check arity, coerce
        let Some(decl) = self.registry.get(&name) else {
            return Ok(DispatchOutcome::Unknown);
        };
        let values = bind_arguments(decl, user, args)?;

        // 7) invoke every bound handler, each isolated
        let invocation = CommandInvocation {
            command: name.clone(),
            user: Arc::clone(user),
            args: values,
        };
        let handlers = self.bindings.handlers_for(&name);
        info!(
            "{} invoked !{} ({} handler(s))",
            user.display_name,
            name,
            handlers.len()
        );

        let mut failures = 0;
        for handler in &handlers {
            if let Err(e) = invoke_isolated(handler.as_ref(), &invocation).await {
                error!("{}", e);
                failures += 1;
            }
        }

        // 8) notify
        if let Some(state) = self.registry.runtime_state(&name).cloned() {
            self.bus.publish_command(Arc::clone(user), state);
        }

        Ok(DispatchOutcome::Invoked {
            handlers: handlers.len(),
            failures,
        })
    }
}

async fn invoke_isolated(handler: &dyn CommandHandler, invocation: &CommandInvocation) -> Result<(), Error> {
    let outcome = AssertUnwindSafe(handler.handle(invocation)).catch_unwind().await;
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::HandlerInvocation {
            command: invocation.command.clone(),
            message: format!("{:#}", e),
        }),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            Err(Error::HandlerInvocation {
                command: invocation.command.clone(),
                message,
            })
        }
    }
}
