//! Infrastructure layer - persistence backends

pub mod database;
pub mod storage;

pub use database::{init_database, DatabaseConfig, SeaOrmStorage};
pub use storage::InMemoryStorage;
