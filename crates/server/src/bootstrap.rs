use std::sync::Arc;

use coffeebuddy_broker::{BrokerError, KafkaRestPublisher};
use coffeebuddy_core::config::{AppConfig, ConfigError};
use coffeebuddy_db::{connect_with_config, migrations, DbPool};
use coffeebuddy_slack::handler::{create_coffee_command_handler, CoffeeCommandHandler};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub publisher: Arc<KafkaRestPublisher>,
    pub command_handler: Arc<CoffeeCommandHandler>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("broker client setup failed: {0}")]
    Broker(#[from] BrokerError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let publisher = Arc::new(KafkaRestPublisher::new(&config.broker)?);
    match publisher.start().await {
        Ok(()) => info!(
            event_name = "system.bootstrap.broker_started",
            correlation_id = "bootstrap",
            topic = %config.broker.topic,
            "broker publisher ready"
        ),
        Err(error) => warn!(
            event_name = "system.bootstrap.broker_unavailable",
            correlation_id = "bootstrap",
            error = %error,
            "broker publisher did not start; cluster lookup will be retried on first publish"
        ),
    }

    let command_handler = Arc::new(create_coffee_command_handler(
        config.slack.signing_secret.clone(),
        publisher.clone(),
        &config.broker,
    ));

    Ok(Application { config, db_pool, publisher, command_handler })
}
