pub mod charger;
pub mod meter_value;
pub mod store;
pub mod transaction;

pub use charger::{Charger, ChargerRegistration, ChargerState};
pub use meter_value::{
    accepts_reading, register_wh, EnergyUpdate, MeterValue, ENERGY_ACTIVE_IMPORT_REGISTER,
};
pub use store::ChargingStore;
pub use transaction::{delivered_energy, CloseOutcome, NewTransaction, Transaction, TransactionStop};

pub use crate::support::errors::{StoreError, StoreResult};
