//! OCPP message handlers

pub mod dispatcher;
mod ocpp_handler;
mod ocpp_v16;

pub use dispatcher::{
    Action, ActionDispatcher, HandlerError, ProtocolError, SharedActionDispatcher,
};
pub use ocpp_handler::OcppHandler;
