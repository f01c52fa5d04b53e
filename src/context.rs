/// Application context and dependency injection
use crate::{
    config::GateConfig,
    db,
    error::GateResult,
    identity::IdentityRepository,
    ledger::EventLedger,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<GateConfig>,
    pub core_db: SqlitePool,
    pub identities: IdentityRepository,
    pub ledger: EventLedger,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: GateConfig) -> GateResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let core_db =
            db::create_pool(&config.storage.core_db, db::DatabaseOptions::default()).await?;

        db::init_schema(&core_db).await?;
        if db::seed_bootstrap_admin(&core_db).await? {
            tracing::info!("Seeded bootstrap admin identity into a fresh store");
        }

        db::test_connection(&core_db).await?;

        let identities = IdentityRepository::new(core_db.clone());
        let ledger = EventLedger::new(core_db.clone());

        tracing::info!(
            device = %config.service.device_name,
            db = %config.storage.core_db.display(),
            "Application context initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            core_db,
            identities,
            ledger,
        })
    }

    /// Create data directories if they don't exist
    async fn ensure_directories(config: &GateConfig) -> GateResult<()> {
        tokio::fs::create_dir_all(&config.storage.data_directory).await?;

        if let Some(parent) = config.storage.core_db.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        Ok(())
    }
}
