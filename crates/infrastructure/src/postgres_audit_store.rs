use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::debug;

use revtrail_application::{AuditStore, NewRevision, PurgeTransaction, RevisionHistoryQuery};
use revtrail_core::{AppError, AppResult, SqlIdentifier};
use revtrail_domain::{AuditRecord, AuditedTypeDescriptor, EntityKey, Revision, RevisionId};

mod columns;
mod purge;
mod rows;


use columns::ShadowColumns;
use purge::PostgresPurgeTransaction;
use rows::{RevisionRow, audit_record_from_row, shadow_row_payload};

/// PostgreSQL-backed audit store.
///
/// Shadow tables are addressed through validated identifiers from the audit
/// configuration, so one adapter serves every audited type. Column types are
/// read from the catalog once per shadow table and cached.
#[derive(Clone)]
pub struct PostgresAuditStore {
    pool: PgPool,
    columns: Arc<RwLock<HashMap<String, Arc<ShadowColumns>>>>,
}

impl PostgresAuditStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            columns: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn shadow_columns(
        &self,
        descriptor: &AuditedTypeDescriptor,
    ) -> AppResult<Arc<ShadowColumns>> {
        let table = descriptor.table_name().as_str();
        if let Some(columns) = self.columns.read().await.get(table) {
            return Ok(Arc::clone(columns));
        }

        let loaded = Arc::new(ShadowColumns::load(&self.pool, descriptor).await?);
        let mut cache = self.columns.write().await;
        Ok(Arc::clone(cache.entry(table.to_owned()).or_insert(loaded)))
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn record_revision(
        &self,
        revision_table: &SqlIdentifier,
        input: NewRevision,
    ) -> AppResult<Revision> {
        for record in &input.records {
            self.shadow_columns(&record.descriptor)
                .await?
                .check_snapshot(&record.descriptor, &record.snapshot)?;
        }

        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start revision transaction: {error}"))
        })?;

        let row = sqlx::query_as::<_, RevisionRow>(&format!(
            r#"
            INSERT INTO {} ("timestamp", username)
            VALUES (COALESCE($1, now()), $2)
            RETURNING id, "timestamp", username
            "#,
            revision_table.quoted()
        ))
        .bind(input.timestamp)
        .bind(input.actor)
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to insert revision: {error}")))?;

        let revision = row.into_revision()?;
        let record_count = input.records.len();

        for record in input.records {
            let table = record.descriptor.table_name().quoted();
            let payload = shadow_row_payload(&record, revision.id());
            let insert = sqlx::query(&format!(
                r#"
                INSERT INTO {table}
                SELECT * FROM jsonb_populate_record(NULL::{table}, $1)
                "#
            ))
            .bind(payload)
            .execute(&mut *transaction)
            .await;

            if let Err(error) = insert {
                let duplicate = error
                    .as_database_error()
                    .is_some_and(|database_error| database_error.is_unique_violation());
                return Err(if duplicate {
                    AppError::Conflict(format!(
                        "'{}' ({}) appears twice in revision {}",
                        record.descriptor.type_name(),
                        record.entity_key,
                        revision.id()
                    ))
                } else {
                    AppError::Internal(format!(
                        "failed to insert audit record into '{}': {error}",
                        record.descriptor.table_name()
                    ))
                });
            }
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit revision: {error}"))
        })?;

        debug!(revision_id = %revision.id(), record_count, "recorded revision");

        Ok(revision)
    }

    async fn list_revisions(
        &self,
        revision_table: &SqlIdentifier,
        query: RevisionHistoryQuery,
    ) -> AppResult<Vec<Revision>> {
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, RevisionRow>(&format!(
            r#"
            SELECT id, "timestamp", username
            FROM {}
            ORDER BY id DESC
            LIMIT $1
            OFFSET $2
            "#,
            revision_table.quoted()
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list revisions: {error}")))?;

        rows.into_iter().map(RevisionRow::into_revision).collect()
    }

    async fn find_revision(
        &self,
        revision_table: &SqlIdentifier,
        revision_id: RevisionId,
    ) -> AppResult<Option<Revision>> {
        let row = sqlx::query_as::<_, RevisionRow>(&format!(
            r#"
            SELECT id, "timestamp", username
            FROM {}
            WHERE id = $1
            "#,
            revision_table.quoted()
        ))
        .bind(revision_id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to find revision {revision_id}: {error}"))
        })?;

        row.map(RevisionRow::into_revision).transpose()
    }

    async fn latest_revision_id(
        &self,
        revision_table: &SqlIdentifier,
    ) -> AppResult<Option<RevisionId>> {
        let latest = sqlx::query_scalar::<_, Option<i64>>(&format!(
            "SELECT MAX(id) FROM {}",
            revision_table.quoted()
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to resolve latest revision: {error}"))
        })?;

        latest.map(RevisionId::new).transpose()
    }

    async fn find_audit_record_at(
        &self,
        descriptor: &AuditedTypeDescriptor,
        entity_key: &EntityKey,
        revision_id: RevisionId,
    ) -> AppResult<Option<AuditRecord>> {
        descriptor.validate_key(entity_key)?;
        let columns = self.shadow_columns(descriptor).await?;
        let revision_parameter = descriptor.key_columns().len() + 1;
        let sql = format!(
            r#"
            SELECT to_jsonb(shadow) AS snapshot
            FROM {} shadow
            WHERE {} AND shadow.{revision} <= ${revision_parameter}
            ORDER BY shadow.{revision} DESC
            LIMIT 1
            "#,
            descriptor.table_name().quoted(),
            columns.key_predicate(descriptor, 1),
            revision = descriptor.revision_field().quoted(),
        );

        let mut query = sqlx::query_scalar::<_, Value>(&sql);
        for value in entity_key.values() {
            query = query.bind(value.as_str());
        }
        let row = query
            .bind(revision_id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to find '{}' ({entity_key}) at revision {revision_id}: {error}",
                    descriptor.type_name()
                ))
            })?;

        row.map(|row| audit_record_from_row(descriptor, row))
            .transpose()
    }

    async fn list_entity_audit_records(
        &self,
        descriptor: &AuditedTypeDescriptor,
        entity_key: &EntityKey,
    ) -> AppResult<Vec<AuditRecord>> {
        descriptor.validate_key(entity_key)?;
        let columns = self.shadow_columns(descriptor).await?;
        let sql = format!(
            r#"
            SELECT to_jsonb(shadow) AS snapshot
            FROM {} shadow
            WHERE {}
            ORDER BY shadow.{} DESC
            "#,
            descriptor.table_name().quoted(),
            columns.key_predicate(descriptor, 1),
            descriptor.revision_field().quoted(),
        );

        let mut query = sqlx::query_scalar::<_, Value>(&sql);
        for value in entity_key.values() {
            query = query.bind(value.as_str());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to list history of '{}' ({entity_key}): {error}",
                descriptor.type_name()
            ))
        })?;

        rows.into_iter()
            .map(|row| audit_record_from_row(descriptor, row))
            .collect()
    }

    async fn list_audit_records_at_revision(
        &self,
        descriptor: &AuditedTypeDescriptor,
        revision_id: RevisionId,
    ) -> AppResult<Vec<AuditRecord>> {
        let rows = sqlx::query_scalar::<_, Value>(&format!(
            r#"
            SELECT to_jsonb(shadow) AS snapshot
            FROM {} shadow
            WHERE shadow.{} = $1
            "#,
            descriptor.table_name().quoted(),
            descriptor.revision_field().quoted(),
        ))
        .bind(revision_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list '{}' changes at revision {revision_id}: {error}",
                descriptor.type_name()
            ))
        })?;

        let mut records = rows
            .into_iter()
            .map(|row| audit_record_from_row(descriptor, row))
            .collect::<AppResult<Vec<_>>>()?;
        records.sort_by(|left, right| left.entity_key().cmp(right.entity_key()));
        Ok(records)
    }

    async fn count_orphaned_audit_records(
        &self,
        descriptor: &AuditedTypeDescriptor,
        revision_table: &SqlIdentifier,
    ) -> AppResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(&purge::orphan_count_sql(
            descriptor,
            revision_table,
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to count orphaned '{}' audit records: {error}",
                descriptor.type_name()
            ))
        })?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn begin_purge(&self) -> AppResult<Box<dyn PurgeTransaction>> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start purge transaction: {error}"))
        })?;

        // Every purge step must see the revisions visible at the first one.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to isolate purge transaction: {error}"))
            })?;

        Ok(Box::new(PostgresPurgeTransaction::new(transaction)))
    }
}
