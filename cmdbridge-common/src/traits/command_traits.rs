use async_trait::async_trait;

use crate::models::CommandInvocation;

/// A live object able to execute the commands declared for its host type.
///
/// Instances are bound to commands while they exist and unbound when they go
/// away; a handler is never called after it has been unbound.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, invocation: &CommandInvocation) -> anyhow::Result<()>;
}
