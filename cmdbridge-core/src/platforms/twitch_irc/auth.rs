use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use cmdbridge_common::Error;

/// Credentials the session needs to frame PASS/NICK/JOIN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCredentials {
    pub username: String,
    pub channel: String,
    pub token: String,
}

/// External provider of a bearer token for (username, channel).
///
/// The browser OAuth flow lives outside this crate; the core only consumes
/// its result.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatAuthenticator: Send + Sync {
    async fn authenticate(&self, username: &str, channel: &str) -> Result<String, Error>;
}

/// Serves the token cached in the settings file.
pub struct CachedTokenAuthenticator {
    token: Option<String>,
}

impl CachedTokenAuthenticator {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl ChatAuthenticator for CachedTokenAuthenticator {
    async fn authenticate(&self, _username: &str, _channel: &str) -> Result<String, Error> {
        match self.token.as_deref().map(str::trim) {
            None => Err(Error::Auth("chat client unauthenticated".into())),
            Some("") | Some("oauth:") => Err(Error::Auth("invalid chat client access token".into())),
            Some(t) => Ok(t.to_string()),
        }
    }
}

/// Asks the authenticator for a token, giving up after `window`.
pub async fn await_credentials(
    authenticator: &dyn ChatAuthenticator,
    username: &str,
    channel: &str,
    window: Duration,
) -> Result<ChatCredentials, Error> {
    if username.trim().is_empty() || channel.trim().is_empty() {
        return Err(Error::Auth("username and channel name are required".into()));
    }

    let token = match tokio::time::timeout(window, authenticator.authenticate(username, channel)).await {
        Ok(res) => res?,
        Err(elapsed) => {
            warn!("Authentication did not finish within {:?}", window);
            return Err(Error::Timeout(elapsed));
        }
    };

    info!("Chat client authenticated as {}", username);
    Ok(ChatCredentials {
        username: username.to_string(),
        channel: channel.to_string(),
        token,
    })
}
