// File: cmdbridge-common/src/models/mod.rs
pub mod command;
pub mod settings;
pub mod user;

pub use command::{
    ArgValue, CommandDeclaration, CommandInvocation, CommandMode, CommandRuntimeState,
    MAX_COOLDOWN_SECS, ParamKind, is_valid_cooldown,
};
pub use settings::{CachedAuth, ChatSettings, CommandSettings};
pub use user::ChatUser;
