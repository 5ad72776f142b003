//! src/platforms/twitch_irc/runtime.rs
//!
//! The chat session: one socket, one channel, driven by a single task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use cmdbridge_common::models::{ChatSettings, ChatUser, CommandMode, CommandRuntimeState};
use cmdbridge_common::traits::CommandHandler;

use crate::Error;
use crate::eventbus::{ChatEvent, EventBus};
use crate::platforms::{Connector, SessionState};
use crate::services::Dispatcher;
use crate::tasks::DeadlineQueue;

use super::auth::ChatCredentials;
use super::client::{
    self, CAP_REQ_TAGS, IrcLine, IrcLink, LinkEvent, USER_JOIN_CODE, USER_MESSAGE_CODE,
};
use super::tags::parse_tagged_line;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub server_addr: String,
    pub credentials: ChatCredentials,
    pub connect_timeout: Duration,
    pub tick_interval: Duration,
}

impl SessionConfig {
    pub fn from_settings(settings: &ChatSettings, credentials: ChatCredentials) -> Self {
        Self {
            server_addr: settings.server_addr.clone(),
            credentials,
            connect_timeout: settings.connect_timeout(),
            tick_interval: settings.tick_interval(),
        }
    }
}

/// Requests other tasks can make of a running session.
pub enum SessionCommand {
    SendMessage {
        text: String,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    SetCommandsEnabled(bool),
    SetCommandMode(CommandMode),
    RegisterHandler {
        handler: Arc<dyn CommandHandler>,
        host_type: String,
    },
    UnregisterHandler {
        handler: Arc<dyn CommandHandler>,
        host_type: String,
    },
    SetCommandEnabled { name: String, enabled: bool },
    SetCommandCooldown { name: String, secs: f64 },
    AvailableCommands(oneshot::Sender<Vec<CommandRuntimeState>>),
    CommandsOnCooldown(oneshot::Sender<Vec<String>>),
    State(oneshot::Sender<SessionState>),
    Reconnect,
    Shutdown,
}

/// Cloneable front door to a session running on its own task. Every call
/// fails with `NotConnected` once the session has stopped.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    fn post(&self, cmd: SessionCommand) -> Result<(), Error> {
        self.tx.send(cmd).map_err(|_| Error::NotConnected)
    }

    async fn ask<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Result<T, Error> {
        let (reply, rx) = oneshot::channel();
        self.post(make(reply))?;
        rx.await.map_err(|_| Error::NotConnected)
    }

    pub async fn send_chat_message(&self, text: &str) -> Result<(), Error> {
        let text = text.to_string();
        self.ask(|reply| SessionCommand::SendMessage { text, reply }).await?
    }

    pub fn set_commands_enabled(&self, enabled: bool) -> Result<(), Error> {
        self.post(SessionCommand::SetCommandsEnabled(enabled))
    }

    pub fn set_command_mode(&self, mode: CommandMode) -> Result<(), Error> {
        self.post(SessionCommand::SetCommandMode(mode))
    }

    pub fn register_handler(&self, handler: Arc<dyn CommandHandler>, host_type: &str) -> Result<(), Error> {
        self.post(SessionCommand::RegisterHandler {
            handler,
            host_type: host_type.to_string(),
        })
    }

    pub fn unregister_handler(&self, handler: Arc<dyn CommandHandler>, host_type: &str) -> Result<(), Error> {
        self.post(SessionCommand::UnregisterHandler {
            handler,
            host_type: host_type.to_string(),
        })
    }

    pub fn set_command_enabled(&self, name: &str, enabled: bool) -> Result<(), Error> {
        self.post(SessionCommand::SetCommandEnabled {
            name: name.to_string(),
            enabled,
        })
    }

    pub fn set_command_cooldown(&self, name: &str, secs: f64) -> Result<(), Error> {
        self.post(SessionCommand::SetCommandCooldown {
            name: name.to_string(),
            secs,
        })
    }

    pub async fn available_commands(&self) -> Result<Vec<CommandRuntimeState>, Error> {
        self.ask(SessionCommand::AvailableCommands).await
    }

    pub async fn commands_on_cooldown(&self) -> Result<Vec<String>, Error> {
        self.ask(SessionCommand::CommandsOnCooldown).await
    }

    pub async fn state(&self) -> Result<SessionState, Error> {
        self.ask(SessionCommand::State).await
    }

    pub fn reconnect(&self) -> Result<(), Error> {
        self.post(SessionCommand::Reconnect)
    }

    pub fn shutdown(&self) -> Result<(), Error> {
        self.post(SessionCommand::Shutdown)
    }
}

pub struct ChatSession {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    bus: EventBus,

    state: SessionState,
    link: Option<IrcLink>,
    /// When false the socket is left unread.
    enabled: bool,
    attempt: u64,
    connect_deadline: DeadlineQueue<u64>,

    commands_tx: mpsc::UnboundedSender<SessionCommand>,
    commands_rx: mpsc::UnboundedReceiver<SessionCommand>,
}

impl ChatSession {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        dispatcher: Dispatcher,
        bus: EventBus,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            config,
            connector,
            dispatcher,
            bus,
            state: SessionState::Disconnected,
            link: None,
            enabled: true,
            attempt: 0,
            connect_deadline: DeadlineQueue::new(),
            commands_tx,
            commands_rx,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.commands_tx.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of connection attempts so far.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(IrcLink::is_open)
    }

    pub fn commands_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_commands_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn available_commands(&self) -> Vec<CommandRuntimeState> {
        self.dispatcher.registry().available_commands()
    }

    pub fn commands_on_cooldown(&self) -> Vec<String> {
        self.dispatcher.cooldowns().on_cooldown()
    }

    /// Starts a fresh connection attempt, dropping any previous socket and
    /// re-arming the connect timeout from `now`.
    pub async fn connect(&mut self, now: Instant) {
        self.drop_link();

        self.attempt += 1;
        let attempt = self.attempt;
        self.state = SessionState::Connecting;
        self.connect_deadline.clear();
        self.connect_deadline
            .schedule(now + self.config.connect_timeout, attempt);

        info!("Connecting to {} (attempt {})", self.config.server_addr, attempt);
        match self.connector.connect(&self.config.server_addr).await {
            Ok(stream) => {
                let link = IrcLink::open(stream);
                let creds = &self.config.credentials;
                let framing = [
                    client::pass_line(&creds.token),
                    client::nick_line(&creds.username),
                    client::join_line(&creds.channel),
                    CAP_REQ_TAGS.to_string(),
                ];
                for line in &framing {
                    link.send_raw_line(line);
                }
                self.link = Some(link);
                self.state = SessionState::Joining;
            }
            Err(e) => {
                // the armed deadline reports and retries this attempt
                warn!("Connect attempt {} failed: {}", attempt, e);
            }
        }
    }

    /// Releases expired cooldowns and fires the connect timeout.
    pub async fn on_tick(&mut self, now: Instant) {
        self.dispatcher.on_tick(now);

        let expired = self.connect_deadline.pop_expired(now);
        if !expired.contains(&self.attempt) || self.state == SessionState::Joined {
            return;
        }

        let err = Error::ConnectTimeout(self.config.connect_timeout);
        warn!("{}; retrying. If several attempts fail, refresh the access token", err);
        self.bus.publish(ChatEvent::FailedToConnect {
            attempt: self.attempt,
        });
        self.connect(now).await;
    }

    /// Reads at most one line the link has already delivered. False when
    /// nothing was pending or commands are disabled.
    pub async fn read_pending(&mut self, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(link) = self.link.as_mut() else {
            return false;
        };
        let event = match link.incoming.try_recv() {
            Ok(event) => event,
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Disconnected) => LinkEvent::Closed,
        };
        self.process_event(event, now).await;
        true
    }

    async fn process_event(&mut self, event: LinkEvent, now: Instant) {
        match event {
            LinkEvent::Line(line) => self.handle_line(&line, now).await,
            LinkEvent::Closed => self.on_link_closed(now).await,
        }
    }

    /// A joined session reconnects straight away. Before the join, the
    /// attempt's armed deadline reports the failure and retries.
    async fn on_link_closed(&mut self, now: Instant) {
        self.drop_link();
        if self.state == SessionState::Joined {
            info!("Chat connection lost, reconnecting");
            self.connect(now).await;
        } else {
            info!("Chat connection closed before join (attempt {})", self.attempt);
            self.state = SessionState::Connecting;
        }
    }

    /// Routes one line from the server.
    pub async fn handle_line(&mut self, line: &str, now: Instant) {
        if let Some(pong) = client::pong_for(line) {
            self.send_raw(&pong);
            return;
        }

        let irc = IrcLine::parse(line);
        match irc.command.as_str() {
            USER_MESSAGE_CODE => self.on_chat_message(line, now).await,
            USER_JOIN_CODE => self.on_joined(),
            _ => debug!("Dropping line: {}", line),
        }
    }

    async fn on_chat_message(&mut self, line: &str, now: Instant) {
        let parsed = match parse_tagged_line(line) {
            Ok(p) => p,
            Err(e) => {
                debug!("{}", e);
                return;
            }
        };

        let user = Arc::new(parsed.user);
        debug!("Chat - {} : {}", user.colored_name(), parsed.body);
        self.bus.publish_message(Arc::clone(&user), &parsed.body);

        if let Err(e) = self.dispatcher.handle_message(&user, &parsed.body, now).await {
            warn!("{}", e);
        }
    }

    fn on_joined(&mut self) {
        if self.state != SessionState::Joining {
            debug!("JOIN while {:?}, ignoring", self.state);
            return;
        }
        self.state = SessionState::Joined;
        self.connect_deadline.clear();
        info!("Successfully joined #{}", self.config.credentials.channel.to_lowercase());
        self.bus.publish(ChatEvent::JoinedChat);
    }

    /// Writes a chat message and echoes it locally as if the server had
    /// delivered it.
    pub async fn send_chat_message(&mut self, text: &str) -> Result<(), Error> {
        let channel = &self.config.credentials.channel;
        let sent = self
            .link
            .as_ref()
            .is_some_and(|link| link.send_raw_line(&client::privmsg_line(channel, text)));
        if !sent {
            return Err(Error::NotConnected);
        }

        let me = Arc::new(ChatUser::with_display_name(channel));
        self.bus.publish_message(me, text);
        Ok(())
    }

    fn send_raw(&self, line: &str) {
        match &self.link {
            Some(link) if link.send_raw_line(line) => {}
            _ => debug!("No open link for: {}", line),
        }
    }

    fn drop_link(&mut self) {
        if let Some(link) = self.link.take() {
            link.shutdown();
        }
    }

    /// Closes the socket and cancels every pending timer.
    pub fn close(&mut self) {
        self.drop_link();
        self.connect_deadline.clear();
        self.dispatcher.reset();
        self.state = SessionState::Disconnected;
        info!("Chat session closed");
    }

    /// Applies one request. False means stop.
    async fn apply(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::SendMessage { text, reply } => {
                let res = self.send_chat_message(&text).await;
                let _ = reply.send(res);
            }
            SessionCommand::SetCommandsEnabled(on) => self.set_commands_enabled(on),
            SessionCommand::SetCommandMode(mode) => self.dispatcher.set_mode(mode),
            SessionCommand::RegisterHandler { handler, host_type } => {
                self.dispatcher.register_handler(handler, &host_type);
            }
            SessionCommand::UnregisterHandler { handler, host_type } => {
                self.dispatcher.unregister_handler(&handler, &host_type);
            }
            SessionCommand::SetCommandEnabled { name, enabled } => {
                if !self.dispatcher.set_command_enabled(&name, enabled) {
                    warn!("Cannot toggle unknown command '{}'", name);
                }
            }
            SessionCommand::SetCommandCooldown { name, secs } => {
                if !self.dispatcher.registry_mut().set_cooldown(&name, secs) {
                    warn!("Cannot set cooldown of '{}' to {}s", name, secs);
                }
            }
            SessionCommand::AvailableCommands(reply) => {
                let _ = reply.send(self.available_commands());
            }
            SessionCommand::CommandsOnCooldown(reply) => {
                let _ = reply.send(self.commands_on_cooldown());
            }
            SessionCommand::State(reply) => {
                let _ = reply.send(self.state);
            }
            SessionCommand::Reconnect => self.connect(Instant::now()).await,
            SessionCommand::Shutdown => return false,
        }
        true
    }

    /// Connects and drives the session until shut down, either through a
    /// handle or by `shutdown` flipping to true.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.connect(Instant::now()).await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.on_tick(Instant::now()).await;
                }
                event = next_link_event(self.link.as_mut(), self.enabled) => {
                    self.process_event(event, Instant::now()).await;
                }
                Some(cmd) = self.commands_rx.recv() => {
                    if !self.apply(cmd).await {
                        break;
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.close();
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.drop_link();
    }
}

async fn next_link_event(link: Option<&mut IrcLink>, enabled: bool) -> LinkEvent {
    match link {
        Some(link) if enabled => link.incoming.recv().await.unwrap_or(LinkEvent::Closed),
        _ => std::future::pending().await,
    }
}
