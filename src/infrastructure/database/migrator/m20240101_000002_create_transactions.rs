//! Create transactions table

use sea_orm_migration::prelude::*;

use super::m20240101_000001_create_chargers::Chargers;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Transactions::ChargerIdentity)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::ConnectorId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::IdTag).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::MeterStartWh)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::StoppedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Transactions::MeterStopWh).big_integer())
                    .col(ColumnDef::new(Transactions::StopReason).string())
                    .col(ColumnDef::new(Transactions::EnergyWh).big_integer())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transactions_charger")
                            .from(Transactions::Table, Transactions::ChargerIdentity)
                            .to(Chargers::Table, Chargers::Identity)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Open-transaction lookups by charger
        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_charger")
                    .table(Transactions::Table)
                    .col(Transactions::ChargerIdentity)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Transactions {
    Table,
    Id,
    ChargerIdentity,
    ConnectorId,
    IdTag,
    StartedAt,
    MeterStartWh,
    StoppedAt,
    MeterStopWh,
    StopReason,
    EnergyWh,
}
