//! Demo commands wired up by the server binary.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use cmdbridge_common::models::{ArgValue, CommandDeclaration, CommandInvocation, ParamKind};
use cmdbridge_common::traits::CommandHandler;
use cmdbridge_core::Error;
use cmdbridge_core::platforms::twitch_irc::SessionHandle;

pub const LOBBY: &str = "Lobby";
pub const ECHO: &str = "Echo";

pub fn declarations() -> Vec<CommandDeclaration> {
    vec![
        CommandDeclaration::new(LOBBY, "join")
            .alias("j")
            .param(ParamKind::User)
            .cooldown(5.0),
        CommandDeclaration::new(LOBBY, "give")
            .param(ParamKind::User)
            .param(ParamKind::Int),
        CommandDeclaration::new(LOBBY, "vote")
            .alias("v")
            .param(ParamKind::User)
            .param(ParamKind::Bool)
            .cooldown(2.0),
        CommandDeclaration::new(ECHO, "say").param(ParamKind::String),
    ]
}

pub fn register_handlers(handle: &SessionHandle) -> Result<(), Error> {
    handle.register_handler(Arc::new(Lobby { chat: handle.clone() }), LOBBY)?;
    handle.register_handler(Arc::new(Echo { chat: handle.clone() }), ECHO)?;
    Ok(())
}

/// Replies without waiting: the session is still busy dispatching the
/// command that triggered the reply.
fn reply(chat: &SessionHandle, text: String) {
    let chat = chat.clone();
    tokio::spawn(async move {
        if let Err(e) = chat.send_chat_message(&text).await {
            tracing::warn!("reply dropped: {}", e);
        }
    });
}

fn sender_name(invocation: &CommandInvocation) -> &str {
    invocation
        .args
        .first()
        .and_then(ArgValue::as_user)
        .map_or(invocation.user.display_name.as_str(), |u| u.display_name.as_str())
}

struct Lobby {
    chat: SessionHandle,
}

#[async_trait]
impl CommandHandler for Lobby {
    async fn handle(&self, invocation: &CommandInvocation) -> anyhow::Result<()> {
        let name = sender_name(invocation);
        match invocation.command.as_str() {
            "join" => {
                info!("{} joined the lobby", name);
                reply(&self.chat, format!("Welcome, {}!", name));
            }
            "give" => {
                let amount = invocation
                    .args
                    .get(1)
                    .and_then(ArgValue::as_int)
                    .ok_or_else(|| anyhow::anyhow!("give without an amount"))?;
                info!("{} gives {}", name, amount);
            }
            "vote" => {
                let yes = invocation.args.get(1).and_then(ArgValue::as_bool).unwrap_or(false);
                info!("{} voted {}", name, if yes { "yes" } else { "no" });
            }
            other => anyhow::bail!("Lobby does not handle '{}'", other),
        }
        Ok(())
    }
}

struct Echo {
    chat: SessionHandle,
}

#[async_trait]
impl CommandHandler for Echo {
    async fn handle(&self, invocation: &CommandInvocation) -> anyhow::Result<()> {
        if let Some(text) = invocation.args.first().and_then(ArgValue::as_str) {
            reply(&self.chat, text.to_string());
        }
        Ok(())
    }
}
