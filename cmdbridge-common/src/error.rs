// ================================================================
// File: cmdbridge-common/src/error.rs
// ================================================================

use std::time::Duration;
use thiserror::Error;

use crate::models::command::ParamKind;

#[derive(Debug, Error)]
pub enum Error {
    /// A wire line without a tag block, a prefix, or a body.
    #[error("Malformed line: {0}")]
    MalformedLine(String),

    /// Two declarations share a name or alias. Fatal at startup.
    #[error("Duplicate command name or alias: {0}")]
    DuplicateCommandName(String),

    #[error("Invalid declaration for command '{command}': {reason}")]
    InvalidDeclaration { command: String, reason: String },

    #[error("Invalid number of arguments for command '{command}': expected {expected}, got {actual}")]
    ArgumentCount {
        command: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid argument {index} for command '{command}': '{literal}' is not a valid {expected}")]
    ArgumentType {
        command: String,
        index: usize,
        literal: String,
        expected: ParamKind,
    },

    #[error("Handler for command '{command}' failed: {message}")]
    HandlerInvocation { command: String, message: String },

    #[error("No join confirmation within {0:?}")]
    ConnectTimeout(Duration),

    #[error("Not connected to chat")]
    NotConnected,

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

impl Error {
    /// Errors that must abort initialization rather than be logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::DuplicateCommandName(_) | Error::InvalidDeclaration { .. } | Error::Config(_)
        )
    }
}
