//! Persistence port used by the protocol engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::charger::{Charger, ChargerRegistration};
use super::meter_value::{EnergyUpdate, MeterValue};
use super::transaction::{CloseOutcome, NewTransaction, Transaction, TransactionStop};
use crate::support::errors::StoreResult;

/// Storage trait for charger, transaction and meter rows
#[async_trait]
pub trait ChargingStore: Send + Sync {
    // Charger operations

    /// Insert on first sight (name = identity), otherwise overwrite the
    /// station-reported fields and last-seen.
    async fn upsert_charger(&self, registration: ChargerRegistration) -> StoreResult<Charger>;
    async fn find_charger(&self, identity: &str) -> StoreResult<Option<Charger>>;
    /// Refresh last-seen. Returns `false` for an unknown charger.
    async fn touch_charger(&self, identity: &str, seen_at: DateTime<Utc>) -> StoreResult<bool>;

    // Transaction operations
    async fn insert_transaction(&self, transaction: NewTransaction) -> StoreResult<Transaction>;
    async fn find_transaction(&self, id: i32) -> StoreResult<Option<Transaction>>;
    async fn find_open_transaction(&self, identity: &str) -> StoreResult<Option<Transaction>>;
    /// Close an open transaction exactly once.
    async fn close_transaction(&self, stop: TransactionStop) -> StoreResult<CloseOutcome>;

    // Meter operations
    async fn insert_meter_value(&self, value: MeterValue) -> StoreResult<()>;
    async fn meter_values_for(&self, transaction_id: i32) -> StoreResult<Vec<MeterValue>>;

    /// Atomically replace the charger's total with `reading_wh` unless a
    /// higher total is already stored.
    async fn update_total_energy_if_not_decreasing(
        &self,
        identity: &str,
        reading_wh: i64,
    ) -> StoreResult<EnergyUpdate>;
}
