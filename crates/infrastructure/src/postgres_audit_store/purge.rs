use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};

use revtrail_application::PurgeTransaction;
use revtrail_core::{AppError, AppResult, SqlIdentifier};
use revtrail_domain::AuditedTypeDescriptor;

pub(super) fn orphan_count_sql(
    descriptor: &AuditedTypeDescriptor,
    revision_table: &SqlIdentifier,
) -> String {
    format!(
        r#"
        SELECT COUNT(*)
        FROM {} shadow
        WHERE NOT EXISTS (
            SELECT 1 FROM {} revision WHERE revision.id = shadow.{}
        )
        "#,
        descriptor.table_name().quoted(),
        revision_table.quoted(),
        descriptor.revision_field().quoted(),
    )
}

/// Purge unit of work over one database transaction.
///
/// `sqlx` rolls the transaction back when it is dropped without a commit.
pub(super) struct PostgresPurgeTransaction {
    transaction: Transaction<'static, Postgres>,
}

impl PostgresPurgeTransaction {
    pub(super) fn new(transaction: Transaction<'static, Postgres>) -> Self {
        Self { transaction }
    }
}

#[async_trait]
impl PurgeTransaction for PostgresPurgeTransaction {
    async fn delete_audit_records_before(
        &mut self,
        descriptor: &AuditedTypeDescriptor,
        revision_table: &SqlIdentifier,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(&format!(
            r#"
            DELETE FROM {} shadow
            USING {} revision
            WHERE shadow.{} = revision.id
                AND revision."timestamp" < $1
            "#,
            descriptor.table_name().quoted(),
            revision_table.quoted(),
            descriptor.revision_field().quoted(),
        ))
        .bind(cutoff)
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to purge audit records from '{}': {error}",
                descriptor.table_name()
            ))
        })?;

        Ok(result.rows_affected())
    }

    async fn delete_revisions_before(
        &mut self,
        revision_table: &SqlIdentifier,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(&format!(
            r#"
            DELETE FROM {}
            WHERE "timestamp" < $1
            "#,
            revision_table.quoted(),
        ))
        .bind(cutoff)
        .execute(&mut *self.transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to purge revisions from '{revision_table}': {error}"
            ))
        })?;

        Ok(result.rows_affected())
    }

    async fn count_orphaned_audit_records(
        &mut self,
        descriptor: &AuditedTypeDescriptor,
        revision_table: &SqlIdentifier,
    ) -> AppResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(&orphan_count_sql(descriptor, revision_table))
            .fetch_one(&mut *self.transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to count orphaned '{}' audit records: {error}",
                    descriptor.type_name()
                ))
            })?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit purge transaction: {error}"))
        })
    }
}
