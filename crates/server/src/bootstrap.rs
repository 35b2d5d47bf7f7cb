use std::sync::Arc;

use pulsey_agent::{
    AgentOrchestrator, EngineStores, HttpTextGenerator, NoopTextGenerator, RandomVariantPicker,
    SummaryRefreshWorker, TextGenerator,
};
use pulsey_core::config::{AppConfig, ConfigError, LoadOptions};
use pulsey_core::insight::classifier::{Classifier, KeywordClassifier};
use pulsey_db::repositories::{
    SqlConversationRepository, SqlEscalationRepository, SqlInstanceRepository,
    SqlMessageRepository, SqlRefreshJobRepository, SqlRosterRepository, SqlRunRepository,
    SqlSummaryRepository,
};
use pulsey_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub stores: EngineStores,
    pub orchestrator: Arc<AgentOrchestrator>,
    pub refresh_worker: Arc<SummaryRefreshWorker>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let conversations = Arc::new(SqlConversationRepository::new(db_pool.clone()));
    let stores = EngineStores {
        conversations,
        messages: Arc::new(SqlMessageRepository::new(db_pool.clone())),
        runs: Arc::new(SqlRunRepository::new(db_pool.clone())),
        summaries: Arc::new(SqlSummaryRepository::new(db_pool.clone())),
        escalations: Arc::new(SqlEscalationRepository::new(db_pool.clone())),
        instances: Arc::new(SqlInstanceRepository::new(db_pool.clone())),
        roster: Arc::new(SqlRosterRepository::new(db_pool.clone())),
        refresh_jobs: Arc::new(SqlRefreshJobRepository::new(db_pool.clone())),
    };

    let generator: Arc<dyn TextGenerator> = match HttpTextGenerator::from_config(&config.generator)
    {
        Some(generator) => Arc::new(generator),
        None => Arc::new(NoopTextGenerator),
    };
    info!(
        event_name = "system.bootstrap.generator_mode",
        correlation_id = "bootstrap",
        configured = generator.is_configured(),
        "text generator initialized"
    );

    let orchestrator = Arc::new(AgentOrchestrator::new(
        stores.clone(),
        generator,
        Arc::new(RandomVariantPicker),
        config.engine.clone(),
    ));

    let classifier: Arc<dyn Classifier> = Arc::new(KeywordClassifier::new());
    let refresh_worker = Arc::new(SummaryRefreshWorker::new(
        stores.clone(),
        classifier,
        std::time::Duration::from_secs(config.engine.refresh_poll_secs),
    ));

    Ok(Application { config, db_pool, stores, orchestrator, refresh_worker })
}
