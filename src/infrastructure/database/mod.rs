pub mod entities;
pub mod migrator;
pub mod store;

pub use store::SeaOrmStorage;

use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use migrator::Migrator;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://./ocpp-power-manager.db?mode=rwc")
    pub url: String,
    /// Apply pending migrations after connecting
    pub auto_migrate: bool,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auto_migrate: true,
        }
    }
}

/// Connect and, unless disabled, bring the schema up to date.
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, sea_orm::DbErr> {
    info!(url = config.url.as_str(), "Connecting to database");
    let db = Database::connect(&config.url).await?;

    if config.auto_migrate {
        info!("Running database migrations...");
        Migrator::up(&db, None).await?;
        info!("Migrations completed");
    }

    Ok(db)
}
