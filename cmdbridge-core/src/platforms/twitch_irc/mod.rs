pub mod auth;
pub mod client;
pub mod runtime;
pub mod tags;

pub use auth::{CachedTokenAuthenticator, ChatAuthenticator, ChatCredentials, await_credentials};
pub use client::{IrcLine, IrcLink, LinkEvent};
pub use runtime::{ChatSession, SessionCommand, SessionConfig, SessionHandle};
pub use tags::{ParsedChatLine, Tag, parse_tagged_line};
