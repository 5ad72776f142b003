pub mod command_traits;

pub use command_traits::CommandHandler;
