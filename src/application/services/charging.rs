//! Charging session and energy bookkeeping

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::{
    register_wh, Charger, ChargerRegistration, ChargerState, ChargingStore, CloseOutcome,
    EnergyUpdate, MeterValue, NewTransaction, StoreResult, Transaction, TransactionStop,
    ENERGY_ACTIVE_IMPORT_REGISTER,
};

/// Result of a StartTransaction attempt
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started(Transaction),
    /// No BootNotification seen for this charge point
    UnknownCharger,
}

/// Service for charger and transaction state changes
pub struct ChargingService {
    store: Arc<dyn ChargingStore>,
}

impl ChargingService {
    pub fn new(store: Arc<dyn ChargingStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ChargingStore> {
        &self.store
    }

    /// Register a charger or refresh its reported identity fields
    pub async fn register(
        &self,
        charge_point_id: &str,
        vendor: &str,
        model: &str,
        firmware_version: Option<&str>,
    ) -> StoreResult<Charger> {
        let charger = self
            .store
            .upsert_charger(ChargerRegistration {
                identity: charge_point_id.to_string(),
                model: model.to_string(),
                vendor: vendor.to_string(),
                firmware_version: firmware_version.map(String::from),
                seen_at: Utc::now(),
            })
            .await?;

        info!(charge_point_id, vendor, model, "Charger registered");
        Ok(charger)
    }

    /// Refresh last-seen. Returns `false` for a charger never booted.
    pub async fn touch(&self, charge_point_id: &str) -> StoreResult<bool> {
        let known = self.store.touch_charger(charge_point_id, Utc::now()).await?;
        if !known {
            debug!(charge_point_id, "Activity from unregistered charger");
        }
        Ok(known)
    }

    pub async fn start_transaction(
        &self,
        charge_point_id: &str,
        connector_id: u32,
        id_tag: &str,
        meter_start_wh: i64,
        started_at: DateTime<Utc>,
    ) -> StoreResult<StartOutcome> {
        if self.store.find_charger(charge_point_id).await?.is_none() {
            warn!(charge_point_id, "StartTransaction from unknown charger");
            return Ok(StartOutcome::UnknownCharger);
        }

        let transaction = self
            .store
            .insert_transaction(NewTransaction {
                charger_identity: charge_point_id.to_string(),
                connector_id,
                id_tag: id_tag.to_string(),
                started_at,
                meter_start_wh,
            })
            .await?;

        info!(
            charge_point_id,
            transaction_id = transaction.id,
            connector_id,
            meter_start_wh,
            "Transaction started"
        );
        Ok(StartOutcome::Started(transaction))
    }

    /// Close a transaction of `stop.charger_identity`. Another charger's
    /// transaction is reported as [`CloseOutcome::NotFound`].
    pub async fn stop_transaction(&self, stop: TransactionStop) -> StoreResult<CloseOutcome> {
        let identity = stop.charger_identity.clone();
        let charge_point_id = identity.as_str();
        let transaction_id = stop.transaction_id;
        let outcome = self.store.close_transaction(stop).await?;

        match &outcome {
            CloseOutcome::Closed(tx) => info!(
                charge_point_id,
                transaction_id,
                energy_wh = tx.energy_wh,
                "Transaction stopped"
            ),
            CloseOutcome::NotFound => {
                warn!(charge_point_id, transaction_id, "StopTransaction for unknown or foreign transaction")
            }
            CloseOutcome::AlreadyClosed => {
                warn!(charge_point_id, transaction_id, "StopTransaction for closed transaction")
            }
        }
        Ok(outcome)
    }

    /// Persist one energy register sample and offer it as the new total.
    ///
    /// The sample row is only written when `transaction_id` names a stored
    /// transaction of this charger; the total is reconciled either way.
    /// Readings that do not fit the counter are dropped untouched.
    pub async fn record_energy_sample(
        &self,
        charge_point_id: &str,
        transaction_id: Option<i32>,
        timestamp: DateTime<Utc>,
        value_wh: f64,
    ) -> StoreResult<EnergyUpdate> {
        let Some(reading_wh) = register_wh(value_wh) else {
            warn!(charge_point_id, reading_wh = value_wh, "Energy reading out of range, dropped");
            metrics::counter!("ocpp_energy_readings_total", "outcome" => "out_of_range")
                .increment(1);
            return Ok(EnergyUpdate::OutOfRange);
        };

        if let Some(transaction_id) = transaction_id {
            let owned = self
                .store
                .find_transaction(transaction_id)
                .await?
                .is_some_and(|tx| tx.charger_identity == charge_point_id);
            if owned {
                self.store
                    .insert_meter_value(MeterValue {
                        transaction_id,
                        timestamp,
                        measurand: ENERGY_ACTIVE_IMPORT_REGISTER.to_string(),
                        value_wh,
                    })
                    .await?;
            } else {
                debug!(
                    charge_point_id,
                    transaction_id, "Sample for unknown or foreign transaction"
                );
            }
        }

        let update = self
            .store
            .update_total_energy_if_not_decreasing(charge_point_id, reading_wh)
            .await?;

        let outcome = match update {
            EnergyUpdate::Accepted { total_wh } => {
                debug!(charge_point_id, total_wh, "Energy total updated");
                "accepted"
            }
            EnergyUpdate::Ignored { stored_wh } => {
                debug!(
                    charge_point_id,
                    stored_wh,
                    reading_wh = value_wh,
                    "Energy reading below stored total, ignored"
                );
                "ignored"
            }
            EnergyUpdate::UnknownCharger => "unknown_charger",
            EnergyUpdate::OutOfRange => "out_of_range",
        };
        metrics::counter!("ocpp_energy_readings_total", "outcome" => outcome).increment(1);
        Ok(update)
    }

    pub async fn charger_state(&self, charge_point_id: &str) -> StoreResult<ChargerState> {
        let charger = self.store.find_charger(charge_point_id).await?;
        let open = match charger {
            Some(_) => self.store.find_open_transaction(charge_point_id).await?,
            None => None,
        };
        Ok(ChargerState::derive(charger.as_ref(), open.as_ref()))
    }
}
