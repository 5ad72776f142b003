pub mod arguments;
pub mod command_registry;
pub mod command_service;
pub mod cooldown;
pub mod handler_bindings;

pub use command_registry::CommandRegistry;
pub use command_service::{DispatchOutcome, Dispatcher, parse_command_line};
pub use cooldown::CooldownTracker;
pub use handler_bindings::HandlerBindings;
