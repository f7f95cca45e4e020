//! WebSocket interfaces
//!
//! - `ocpp_server`: OCPP 1.6 WebSocket server and per-connection supervisor

pub mod ocpp_server;

pub use ocpp_server::OcppServer;
