//! Revtrail retention worker runtime.

#![forbid(unsafe_code)]

mod config;

use std::env;
use std::sync::Arc;

use revtrail_application::{AuditManager, AuditPurger};
use revtrail_core::{AppError, AppResult};
use revtrail_infrastructure::PostgresAuditStore;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{WorkerConfig, required_env};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

    if migrate_only {
        let pool = connect_pool(required_env("DATABASE_URL")?.as_str()).await?;
        run_migrations(&pool).await?;
        info!("database migrations applied successfully");
        return Ok(());
    }

    let config = WorkerConfig::load()?;
    let manager = AuditManager::new(config.audit_configuration()?);
    let pool = connect_pool(config.database_url.as_str()).await?;
    run_migrations(&pool).await?;

    let purger = manager.create_audit_purger(Arc::new(PostgresAuditStore::new(pool)));
    let configuration = manager.configuration();

    info!(
        audited_types = configuration.audited_types().len(),
        revision_table = %configuration.revision_table_name(),
        retention_months = ?configuration.retention_period_months(),
        purge_interval_seconds = config.purge_interval.as_secs(),
        purge_once = config.purge_once,
        "revtrail-worker started"
    );

    loop {
        let outcome = run_purge(&purger).await;

        if config.purge_once {
            return outcome;
        }

        if let Err(error) = outcome {
            if error.is_fatal() {
                return Err(error);
            }
            warn!(error = %error, "purge sweep failed, retrying after the next interval");
        }

        tokio::time::sleep(config.purge_interval).await;
    }
}

async fn run_purge(purger: &AuditPurger) -> AppResult<()> {
    match purger.purge(None).await {
        Ok(report) if report.is_disabled() => {
            info!("no retention period configured, purge skipped");
            Ok(())
        }
        Ok(report) => {
            info!(
                purge_date = ?report.purge_date,
                deleted_revisions = report.deleted_revisions,
                deleted_audit_records = report.deleted_audit_records(),
                "purge sweep completed"
            );
            Ok(())
        }
        Err(error) if error.is_fatal() => {
            error!(error = %error, "audit integrity violated, stopping worker");
            Err(error)
        }
        Err(error) => Err(error),
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
