pub mod connection;
pub mod registry;

pub use connection::{Connection, EvictedSession};
pub use registry::{RegisterResult, SessionRegistry, SharedSessionRegistry};
