//! In-memory storage implementation

use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::domain::{
    accepts_reading, Charger, ChargerRegistration, ChargingStore, CloseOutcome, EnergyUpdate,
    MeterValue, NewTransaction, StoreResult, Transaction, TransactionStop,
};

/// In-memory storage for development and testing
///
/// Per-key updates run under the DashMap shard lock, which gives the
/// conditional energy update the same check-and-set semantics as the SQL
/// store.
pub struct InMemoryStorage {
    chargers: DashMap<String, Charger>,
    transactions: DashMap<i32, Transaction>,
    meter_values: DashMap<i32, Vec<MeterValue>>,
    transaction_counter: AtomicI32,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            chargers: DashMap::new(),
            transactions: DashMap::new(),
            meter_values: DashMap::new(),
            transaction_counter: AtomicI32::new(1),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChargingStore for InMemoryStorage {
    async fn upsert_charger(&self, registration: ChargerRegistration) -> StoreResult<Charger> {
        let charger = self
            .chargers
            .entry(registration.identity.clone())
            .and_modify(|c| c.apply_registration(&registration))
            .or_insert_with(|| Charger::from_registration(&registration))
            .clone();
        Ok(charger)
    }

    async fn find_charger(&self, identity: &str) -> StoreResult<Option<Charger>> {
        Ok(self.chargers.get(identity).map(|c| c.clone()))
    }

    async fn touch_charger(&self, identity: &str, seen_at: DateTime<Utc>) -> StoreResult<bool> {
        match self.chargers.get_mut(identity) {
            Some(mut charger) => {
                charger.last_seen = Some(seen_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_transaction(&self, transaction: NewTransaction) -> StoreResult<Transaction> {
        let id = self.transaction_counter.fetch_add(1, Ordering::SeqCst);
        let transaction = transaction.into_transaction(id);
        self.transactions.insert(id, transaction.clone());
        Ok(transaction)
    }

    async fn find_transaction(&self, id: i32) -> StoreResult<Option<Transaction>> {
        Ok(self.transactions.get(&id).map(|t| t.clone()))
    }

    async fn find_open_transaction(&self, identity: &str) -> StoreResult<Option<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .filter(|t| t.charger_identity == identity && t.is_open())
            .max_by_key(|t| t.id)
            .map(|t| t.value().clone()))
    }

    async fn close_transaction(&self, stop: TransactionStop) -> StoreResult<CloseOutcome> {
        let Some(mut transaction) = self
            .transactions
            .get_mut(&stop.transaction_id)
            .filter(|t| t.charger_identity == stop.charger_identity)
        else {
            return Ok(CloseOutcome::NotFound);
        };
        if transaction.close(stop.meter_stop_wh, stop.stopped_at, stop.reason) {
            Ok(CloseOutcome::Closed(transaction.clone()))
        } else {
            Ok(CloseOutcome::AlreadyClosed)
        }
    }

    async fn insert_meter_value(&self, value: MeterValue) -> StoreResult<()> {
        self.meter_values
            .entry(value.transaction_id)
            .or_default()
            .push(value);
        Ok(())
    }

    async fn meter_values_for(&self, transaction_id: i32) -> StoreResult<Vec<MeterValue>> {
        Ok(self
            .meter_values
            .get(&transaction_id)
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn update_total_energy_if_not_decreasing(
        &self,
        identity: &str,
        reading_wh: i64,
    ) -> StoreResult<EnergyUpdate> {
        let Some(mut charger) = self.chargers.get_mut(identity) else {
            return Ok(EnergyUpdate::UnknownCharger);
        };
        match charger.total_energy_wh {
            Some(stored_wh) if !accepts_reading(Some(stored_wh), reading_wh) => {
                Ok(EnergyUpdate::Ignored { stored_wh })
            }
            _ => {
                charger.total_energy_wh = Some(reading_wh);
                Ok(EnergyUpdate::Accepted {
                    total_wh: reading_wh,
                })
            }
        }
    }
}
