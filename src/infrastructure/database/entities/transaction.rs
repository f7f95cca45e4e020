//! Transaction entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub charger_identity: String,
    pub connector_id: i32,
    pub id_tag: String,

    pub started_at: DateTimeUtc,
    pub meter_start_wh: i64,

    #[sea_orm(nullable)]
    pub stopped_at: Option<DateTimeUtc>,

    #[sea_orm(nullable)]
    pub meter_stop_wh: Option<i64>,

    /// OCPP stop reason: EmergencyStop, EVDisconnected, Local, Remote, ...
    #[sea_orm(nullable)]
    pub stop_reason: Option<String>,

    /// Energy delivered in Wh
    #[sea_orm(nullable)]
    pub energy_wh: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::charger::Entity",
        from = "Column::ChargerIdentity",
        to = "super::charger::Column::Identity"
    )]
    Charger,
    #[sea_orm(has_many = "super::meter_value::Entity")]
    MeterValues,
}

impl Related<super::charger::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Charger.def()
    }
}

impl Related<super::meter_value::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MeterValues.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
