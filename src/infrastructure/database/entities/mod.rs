//! Database entities module

pub mod charger;
pub mod meter_value;
pub mod transaction;

pub use charger::Entity as Charger;
pub use meter_value::Entity as MeterValue;
pub use transaction::Entity as Transaction;
