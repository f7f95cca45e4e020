//! SeaORM implementation of ChargingStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::debug;

use super::entities::{charger, meter_value, transaction};
use crate::domain::{
    Charger, ChargerRegistration, ChargingStore, CloseOutcome, EnergyUpdate, MeterValue,
    NewTransaction, StoreError, StoreResult, Transaction, TransactionStop,
};

pub struct SeaOrmStorage {
    db: DatabaseConnection,
}

impl SeaOrmStorage {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn charger_from_model(m: charger::Model) -> Charger {
    Charger {
        identity: m.identity,
        name: m.name,
        model: m.model,
        vendor: m.vendor,
        firmware_version: m.firmware_version,
        max_output_kw: m.max_output_kw,
        last_seen: m.last_seen,
        total_energy_wh: m.total_energy_wh,
        created_at: m.created_at,
    }
}

fn transaction_from_model(m: transaction::Model) -> Transaction {
    Transaction {
        id: m.id,
        charger_identity: m.charger_identity,
        connector_id: m.connector_id.max(0) as u32,
        id_tag: m.id_tag,
        started_at: m.started_at,
        meter_start_wh: m.meter_start_wh,
        stopped_at: m.stopped_at,
        meter_stop_wh: m.meter_stop_wh,
        stop_reason: m.stop_reason,
        energy_wh: m.energy_wh,
    }
}

fn meter_value_from_model(m: meter_value::Model) -> MeterValue {
    MeterValue {
        transaction_id: m.transaction_id,
        timestamp: m.ts,
        measurand: m.measurand,
        value_wh: m.value_wh,
    }
}

// ── ChargingStore impl ──────────────────────────────────────────

#[async_trait]
impl ChargingStore for SeaOrmStorage {
    async fn upsert_charger(&self, registration: ChargerRegistration) -> StoreResult<Charger> {
        debug!(charge_point_id = registration.identity.as_str(), "Upserting charger");

        let fresh = Charger::from_registration(&registration);
        let model = charger::ActiveModel {
            identity: Set(fresh.identity.clone()),
            name: Set(fresh.name),
            model: Set(fresh.model),
            vendor: Set(fresh.vendor),
            firmware_version: Set(fresh.firmware_version),
            max_output_kw: Set(None),
            last_seen: Set(fresh.last_seen),
            total_energy_wh: Set(None),
            created_at: Set(fresh.created_at),
        };

        // name, rating, total and created_at survive a re-registration
        charger::Entity::insert(model)
            .on_conflict(
                OnConflict::column(charger::Column::Identity)
                    .update_columns([
                        charger::Column::Model,
                        charger::Column::Vendor,
                        charger::Column::FirmwareVersion,
                        charger::Column::LastSeen,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        charger::Entity::find_by_id(fresh.identity.clone())
            .one(&self.db)
            .await?
            .map(charger_from_model)
            .ok_or_else(|| {
                StoreError::Unavailable(format!("charger {} vanished after upsert", fresh.identity))
            })
    }

    async fn find_charger(&self, identity: &str) -> StoreResult<Option<Charger>> {
        Ok(charger::Entity::find_by_id(identity.to_string())
            .one(&self.db)
            .await?
            .map(charger_from_model))
    }

    async fn touch_charger(&self, identity: &str, seen_at: DateTime<Utc>) -> StoreResult<bool> {
        let result = charger::Entity::update_many()
            .col_expr(charger::Column::LastSeen, Expr::value(seen_at))
            .filter(charger::Column::Identity.eq(identity))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn insert_transaction(&self, tx: NewTransaction) -> StoreResult<Transaction> {
        let model = transaction::ActiveModel {
            id: NotSet,
            charger_identity: Set(tx.charger_identity),
            connector_id: Set(tx.connector_id as i32),
            id_tag: Set(tx.id_tag),
            started_at: Set(tx.started_at),
            meter_start_wh: Set(tx.meter_start_wh),
            stopped_at: Set(None),
            meter_stop_wh: Set(None),
            stop_reason: Set(None),
            energy_wh: Set(None),
        };
        let inserted = model.insert(&self.db).await?;
        Ok(transaction_from_model(inserted))
    }

    async fn find_transaction(&self, id: i32) -> StoreResult<Option<Transaction>> {
        Ok(transaction::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(transaction_from_model))
    }

    async fn find_open_transaction(&self, identity: &str) -> StoreResult<Option<Transaction>> {
        Ok(transaction::Entity::find()
            .filter(transaction::Column::ChargerIdentity.eq(identity))
            .filter(transaction::Column::StoppedAt.is_null())
            .order_by_desc(transaction::Column::Id)
            .one(&self.db)
            .await?
            .map(transaction_from_model))
    }

    async fn close_transaction(&self, stop: TransactionStop) -> StoreResult<CloseOutcome> {
        // Another charger's transaction is indistinguishable from a missing one
        let Some(model) = transaction::Entity::find_by_id(stop.transaction_id)
            .filter(transaction::Column::ChargerIdentity.eq(stop.charger_identity.as_str()))
            .one(&self.db)
            .await?
        else {
            return Ok(CloseOutcome::NotFound);
        };

        let mut tx = transaction_from_model(model);
        if !tx.close(stop.meter_stop_wh, stop.stopped_at, stop.reason) {
            return Ok(CloseOutcome::AlreadyClosed);
        }

        // Guarded on stopped_at so a concurrent stop cannot close it twice
        let result = transaction::Entity::update_many()
            .col_expr(transaction::Column::StoppedAt, Expr::value(tx.stopped_at))
            .col_expr(transaction::Column::MeterStopWh, Expr::value(tx.meter_stop_wh))
            .col_expr(transaction::Column::StopReason, Expr::value(tx.stop_reason.clone()))
            .col_expr(transaction::Column::EnergyWh, Expr::value(tx.energy_wh))
            .filter(transaction::Column::Id.eq(tx.id))
            .filter(transaction::Column::ChargerIdentity.eq(tx.charger_identity.as_str()))
            .filter(transaction::Column::StoppedAt.is_null())
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(CloseOutcome::AlreadyClosed);
        }
        Ok(CloseOutcome::Closed(tx))
    }

    async fn insert_meter_value(&self, value: MeterValue) -> StoreResult<()> {
        let model = meter_value::ActiveModel {
            id: NotSet,
            transaction_id: Set(value.transaction_id),
            ts: Set(value.timestamp),
            measurand: Set(value.measurand),
            value_wh: Set(value.value_wh),
        };
        model.insert(&self.db).await?;
        Ok(())
    }

    async fn meter_values_for(&self, transaction_id: i32) -> StoreResult<Vec<MeterValue>> {
        let models = meter_value::Entity::find()
            .filter(meter_value::Column::TransactionId.eq(transaction_id))
            .order_by_asc(meter_value::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(meter_value_from_model).collect())
    }

    async fn update_total_energy_if_not_decreasing(
        &self,
        identity: &str,
        reading_wh: i64,
    ) -> StoreResult<EnergyUpdate> {
        // UPDATE chargers SET total_energy_wh = ?
        //  WHERE identity = ? AND (total_energy_wh IS NULL OR total_energy_wh <= ?)
        let result = charger::Entity::update_many()
            .col_expr(charger::Column::TotalEnergyWh, Expr::value(reading_wh))
            .filter(charger::Column::Identity.eq(identity))
            .filter(
                Condition::any()
                    .add(charger::Column::TotalEnergyWh.is_null())
                    .add(charger::Column::TotalEnergyWh.lte(reading_wh)),
            )
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            return Ok(EnergyUpdate::Accepted {
                total_wh: reading_wh,
            });
        }

        let stored = charger::Entity::find_by_id(identity.to_string())
            .one(&self.db)
            .await?;
        Ok(match stored {
            None => EnergyUpdate::UnknownCharger,
            Some(m) => EnergyUpdate::Ignored {
                stored_wh: m.total_energy_wh.unwrap_or_default(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::migrator::Migrator;
    use sea_orm::{ConnectOptions, Database};
    use sea_orm_migration::MigratorTrait;

    async fn store() -> SeaOrmStorage {
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opts).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        SeaOrmStorage::new(db)
    }

    fn registration(firmware: &str) -> ChargerRegistration {
        ChargerRegistration {
            identity: "CP-1".into(),
            model: "Wallbox".into(),
            vendor: "Acme".into(),
            firmware_version: Some(firmware.into()),
            seen_at: Utc::now(),
        }
    }

    fn new_tx(meter_start_wh: i64) -> NewTransaction {
        NewTransaction {
            charger_identity: "CP-1".into(),
            connector_id: 1,
            id_tag: "TAG".into(),
            started_at: Utc::now(),
            meter_start_wh,
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_reported_fields_only() {
        let store = store().await;
        let first = store.upsert_charger(registration("1.0")).await.unwrap();
        assert_eq!(first.name, "CP-1");

        charger::Entity::update_many()
            .col_expr(charger::Column::Name, Expr::value("Garage"))
            .exec(store.connection())
            .await
            .unwrap();

        let second = store.upsert_charger(registration("2.0")).await.unwrap();
        assert_eq!(second.name, "Garage");
        assert_eq!(second.firmware_version.as_deref(), Some("2.0"));
        assert!(second.last_seen >= first.last_seen);
        assert_eq!(charger::Entity::find().all(store.connection()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn conditional_energy_update() {
        let store = store().await;
        assert_eq!(
            store
                .update_total_energy_if_not_decreasing("CP-1", 10)
                .await
                .unwrap(),
            EnergyUpdate::UnknownCharger
        );

        store.upsert_charger(registration("1.0")).await.unwrap();
        let mut outcomes = Vec::new();
        for reading in [1000, 1500, 900, 1600] {
            outcomes.push(
                store
                    .update_total_energy_if_not_decreasing("CP-1", reading)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(
            outcomes,
            vec![
                EnergyUpdate::Accepted { total_wh: 1000 },
                EnergyUpdate::Accepted { total_wh: 1500 },
                EnergyUpdate::Ignored { stored_wh: 1500 },
                EnergyUpdate::Accepted { total_wh: 1600 },
            ]
        );
        let charger = store.find_charger("CP-1").await.unwrap().unwrap();
        assert_eq!(charger.total_energy_wh, Some(1600));
    }

    #[tokio::test]
    async fn concurrent_energy_updates_keep_maximum() {
        let store = store().await;
        store.upsert_charger(registration("1.0")).await.unwrap();

        let readings: Vec<i64> = (1..=40).map(|i| (i * 37 % 41) * 100).collect();
        let outcomes = futures_util::future::join_all(
            readings
                .iter()
                .map(|r| store.update_total_energy_if_not_decreasing("CP-1", *r)),
        )
        .await;
        assert!(outcomes.iter().all(|o| o.is_ok()));

        let max = readings.iter().copied().max().unwrap();
        let charger = store.find_charger("CP-1").await.unwrap().unwrap();
        assert_eq!(charger.total_energy_wh, Some(max));
    }

    #[tokio::test]
    async fn transaction_lifecycle() {
        let store = store().await;
        store.upsert_charger(registration("1.0")).await.unwrap();

        let tx = store.insert_transaction(new_tx(5000)).await.unwrap();
        assert!(tx.id > 0);
        assert_eq!(
            store.find_open_transaction("CP-1").await.unwrap().map(|t| t.id),
            Some(tx.id)
        );

        store
            .insert_meter_value(MeterValue {
                transaction_id: tx.id,
                timestamp: Utc::now(),
                measurand: crate::domain::ENERGY_ACTIVE_IMPORT_REGISTER.into(),
                value_wh: 5100.0,
            })
            .await
            .unwrap();
        assert_eq!(store.meter_values_for(tx.id).await.unwrap().len(), 1);

        let foreign = TransactionStop {
            charger_identity: "CP-2".into(),
            transaction_id: tx.id,
            meter_stop_wh: 100,
            stopped_at: Utc::now(),
            reason: None,
        };
        assert_eq!(
            store.close_transaction(foreign).await.unwrap(),
            CloseOutcome::NotFound
        );
        assert!(store.find_transaction(tx.id).await.unwrap().unwrap().is_open());

        let stop = TransactionStop {
            charger_identity: "CP-1".into(),
            transaction_id: tx.id,
            meter_stop_wh: 4800,
            stopped_at: Utc::now(),
            reason: Some("EVDisconnected".into()),
        };
        match store.close_transaction(stop.clone()).await.unwrap() {
            CloseOutcome::Closed(closed) => assert_eq!(closed.energy_wh, Some(0)),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(
            store.close_transaction(stop).await.unwrap(),
            CloseOutcome::AlreadyClosed
        );

        let stored = store.find_transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(stored.meter_stop_wh, Some(4800));
        assert_eq!(stored.stop_reason.as_deref(), Some("EVDisconnected"));
        assert!(store.find_open_transaction("CP-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn touch_reports_unknown_charger() {
        let store = store().await;
        assert!(!store.touch_charger("CP-1", Utc::now()).await.unwrap());
        store.upsert_charger(registration("1.0")).await.unwrap();
        assert!(store.touch_charger("CP-1", Utc::now()).await.unwrap());
    }
}
