use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::user::ChatUser;

/// The type a command parameter is coerced to.
///
/// `User` is the implicit sender context and may only appear first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    User,
    Int,
    Float,
    Bool,
    String,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::User => write!(f, "user"),
            ParamKind::Int => write!(f, "int"),
            ParamKind::Float => write!(f, "float"),
            ParamKind::Bool => write!(f, "bool"),
            ParamKind::String => write!(f, "string"),
        }
    }
}

/// A coerced command argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    User(Arc<ChatUser>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ArgValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ArgValue::User(_) => ParamKind::User,
            ArgValue::Int(_) => ParamKind::Int,
            ArgValue::Float(_) => ParamKind::Float,
            ArgValue::Bool(_) => ParamKind::Bool,
            ArgValue::Text(_) => ParamKind::String,
        }
    }

    pub fn as_user(&self) -> Option<&ChatUser> {
        match self {
            ArgValue::User(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ArgValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// Static metadata for one chat command (e.g. `!join`), supplied by host code
/// when the registry is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDeclaration {
    pub name: String,
    pub aliases: Vec<String>,
    pub params: Vec<ParamKind>,
    pub default_cooldown_secs: f64,

    /// Name of the host type whose instances execute this command.
    pub host_type: String,
}

impl CommandDeclaration {
    pub fn new(host_type: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            params: Vec::new(),
            default_cooldown_secs: 0.0,
            host_type: host_type.to_string(),
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn param(mut self, kind: ParamKind) -> Self {
        self.params.push(kind);
        self
    }

    pub fn cooldown(mut self, secs: f64) -> Self {
        self.default_cooldown_secs = secs;
        self
    }

    /// True when the first parameter receives the sender instead of a chat argument.
    pub fn takes_user(&self) -> bool {
        self.params.first() == Some(&ParamKind::User)
    }

    /// The parameters matched against whitespace-split chat arguments.
    pub fn text_params(&self) -> &[ParamKind] {
        if self.takes_user() {
            &self.params[1..]
        } else {
            &self.params
        }
    }
}

/// Longest cooldown a command may carry: one day.
pub const MAX_COOLDOWN_SECS: f64 = 86_400.0;

/// Finite, non-negative and no longer than `MAX_COOLDOWN_SECS`.
pub fn is_valid_cooldown(secs: f64) -> bool {
    secs.is_finite() && (0.0..=MAX_COOLDOWN_SECS).contains(&secs)
}

/// Mutable per-command settings: whether the command may run and how long it
/// is suppressed after running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRuntimeState {
    pub name: String,
    pub enabled: bool,
    pub cooldown_secs: f64,
}

impl CommandRuntimeState {
    pub fn from_declaration(decl: &CommandDeclaration) -> Self {
        Self {
            name: decl.name.clone(),
            enabled: true,
            cooldown_secs: decl.default_cooldown_secs,
        }
    }

    /// Cooldown as a duration; negative or non-finite values count as zero
    /// and anything longer is capped at `MAX_COOLDOWN_SECS`.
    pub fn cooldown(&self) -> Duration {
        if self.cooldown_secs.is_nan() {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.cooldown_secs.min(MAX_COOLDOWN_SECS))
            .unwrap_or(Duration::ZERO)
    }
}

impl fmt::Display for CommandRuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Global dispatch policy for repeated commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandMode {
    #[default]
    Disabled,
    Cooldown,
}

/// One call handed to every handler bound to a command.
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub command: String,
    pub user: Arc<ChatUser>,
    pub args: Vec<ArgValue>,
}
