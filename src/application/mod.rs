pub mod commands;
pub mod handlers;
pub mod services;
pub mod session;

pub use commands::{create_command_sender, CommandSender, SharedCommandSender};
pub use handlers::{ActionDispatcher, OcppHandler, ProtocolError, SharedActionDispatcher};
pub use services::ChargingService;
pub use session::{SessionRegistry, SharedSessionRegistry};
