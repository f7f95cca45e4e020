//! Create chargers table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Chargers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Chargers::Identity)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Chargers::Name).string().not_null())
                    .col(ColumnDef::new(Chargers::Model).string().not_null())
                    .col(ColumnDef::new(Chargers::Vendor).string().not_null())
                    .col(ColumnDef::new(Chargers::FirmwareVersion).string())
                    .col(ColumnDef::new(Chargers::MaxOutputKw).double())
                    .col(ColumnDef::new(Chargers::LastSeen).timestamp_with_time_zone())
                    .col(ColumnDef::new(Chargers::TotalEnergyWh).big_integer())
                    .col(
                        ColumnDef::new(Chargers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Chargers::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Chargers {
    Table,
    Identity,
    Name,
    Model,
    Vendor,
    FirmwareVersion,
    MaxOutputKw,
    LastSeen,
    TotalEnergyWh,
    CreatedAt,
}
