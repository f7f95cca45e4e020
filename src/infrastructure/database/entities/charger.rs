//! Charger entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "chargers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub identity: String,

    pub name: String,
    pub model: String,
    pub vendor: String,

    #[sea_orm(nullable)]
    pub firmware_version: Option<String>,

    #[sea_orm(nullable)]
    pub max_output_kw: Option<f64>,

    #[sea_orm(nullable)]
    pub last_seen: Option<DateTimeUtc>,

    /// Cumulative energy register in Wh
    #[sea_orm(nullable)]
    pub total_energy_wh: Option<i64>,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
