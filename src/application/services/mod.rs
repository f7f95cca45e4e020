//! Application services

mod charging;

pub use charging::{ChargingService, StartOutcome};
