//! # OCPP Power Manager
//!
//! OCPP 1.6J Central System for EV charging stations: accepts charge point
//! WebSocket connections, answers their calls, tracks charging sessions and
//! cumulative energy, and pushes commands back to connected stations.
//!
//! ## Architecture
//!
//! - **support**: OCPP-J frame codec, error types, shutdown signal
//! - **domain**: chargers, transactions, meter values and the storage trait
//! - **application**: session registry, action dispatcher, handlers, command issuer
//! - **infrastructure**: SeaORM and in-memory storage backends
//! - **interfaces**: WebSocket server and per-connection supervisor
//! - **server**: process bootstrap shared by the CLI

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod support;

pub use config::{default_config_path, AppConfig};
pub use infrastructure::{init_database, DatabaseConfig, InMemoryStorage, SeaOrmStorage};
pub use interfaces::OcppServer;
pub use server::{init_tracing, ServerHandle, ServerOptions};
pub use support::ocpp_frame::{ErrorCode, FrameError, OcppFrame};
