//! cmdbridge-server/src/server.rs
//!
//! Builds the command registry and chat session from the loaded settings and
//! runs them until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use cmdbridge_core::Error;
use cmdbridge_core::eventbus::ChatEvent;
use cmdbridge_core::platforms::TcpConnector;
use cmdbridge_core::platforms::twitch_irc::{
    CachedTokenAuthenticator, ChatSession, SessionConfig, await_credentials,
};
use cmdbridge_core::services::{CommandRegistry, Dispatcher};

use crate::context::ServerContext;
use crate::demo;

/// How long to wait for the authenticator before giving up.
const AUTH_WINDOW: Duration = Duration::from_secs(60);

pub async fn run_server(mut ctx: ServerContext) -> Result<(), Error> {
    if !ctx.settings.initialize_on_start {
        info!("initialize_on_start is off; not connecting.");
        return Ok(());
    }

    // 1) Credentials
    let authenticator = CachedTokenAuthenticator::new(ctx.settings.auth.token.clone());
    let credentials = await_credentials(
        &authenticator,
        &ctx.settings.auth.username,
        &ctx.settings.auth.channel_name,
        AUTH_WINDOW,
    )
    .await?;

    // 2) Registry, reconciled with the persisted per-command settings
    let registry = CommandRegistry::build_with_settings(demo::declarations(), &ctx.settings.commands)?;
    ctx.settings.commands = registry.command_settings();
    if let Err(e) = ctx.persist() {
        warn!("Could not save reconciled settings: {}", e);
    }

    // 3) Session
    let bus = ctx.event_bus.clone();
    let dispatcher = Dispatcher::new(
        registry,
        ctx.settings.commands_mode,
        &ctx.settings.command_prefix,
        bus.clone(),
    );
    let session = ChatSession::new(
        SessionConfig::from_settings(&ctx.settings, credentials),
        Arc::new(TcpConnector),
        dispatcher,
        bus.clone(),
    );
    let handle = session.handle();
    demo::register_handlers(&handle)?;

    // 4) Event logger
    let logger = tokio::spawn(log_events(bus.subscribe(None)));

    // 5) Ctrl-C => signal
    let bus_for_ctrlc = bus.clone();
    let _ctrlc_handle = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
        }
        info!("Ctrl-C detected; shutting down...");
        bus_for_ctrlc.shutdown();
    });

    session.run(bus.shutdown_signal()).await;

    logger.abort();
    info!("Server shutdown complete.");
    Ok(())
}

async fn log_events(mut rx: mpsc::Receiver<ChatEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            ChatEvent::JoinedChat => info!("Connected to the chat!"),
            ChatEvent::MessageReceived { user, text, timestamp } => {
                debug!("[{}] {}: {}", timestamp.format("%H:%M:%S"), user.display_name, text);
            }
            ChatEvent::CommandReceived { user, command, .. } => {
                info!("{} used !{}", user.display_name, command);
            }
            ChatEvent::FailedToConnect { attempt } => {
                warn!("Failed to connect (attempt {})", attempt);
            }
        }
    }
}
