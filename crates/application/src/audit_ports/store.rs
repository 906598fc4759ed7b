use async_trait::async_trait;
use chrono::{DateTime, Utc};

use revtrail_core::{AppResult, SqlIdentifier};
use revtrail_domain::{AuditRecord, AuditedTypeDescriptor, EntityKey, Revision, RevisionId};

use super::history::{NewRevision, RevisionHistoryQuery};

/// Persistence port for revisions and their shadow tables.
///
/// Every method receives the revision table name from the audit configuration
/// so readers and purgers always address the same table.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Inserts a revision and its audit records atomically.
    async fn record_revision(
        &self,
        revision_table: &SqlIdentifier,
        input: NewRevision,
    ) -> AppResult<Revision>;

    /// Lists revisions newest first.
    async fn list_revisions(
        &self,
        revision_table: &SqlIdentifier,
        query: RevisionHistoryQuery,
    ) -> AppResult<Vec<Revision>>;

    /// Finds one revision by identifier.
    async fn find_revision(
        &self,
        revision_table: &SqlIdentifier,
        revision_id: RevisionId,
    ) -> AppResult<Option<Revision>>;

    /// Returns the highest assigned revision identifier.
    async fn latest_revision_id(
        &self,
        revision_table: &SqlIdentifier,
    ) -> AppResult<Option<RevisionId>>;

    /// Returns the latest audit record of an entity at or before a revision.
    async fn find_audit_record_at(
        &self,
        descriptor: &AuditedTypeDescriptor,
        entity_key: &EntityKey,
        revision_id: RevisionId,
    ) -> AppResult<Option<AuditRecord>>;

    /// Lists every audit record of an entity, newest first.
    async fn list_entity_audit_records(
        &self,
        descriptor: &AuditedTypeDescriptor,
        entity_key: &EntityKey,
    ) -> AppResult<Vec<AuditRecord>>;

    /// Lists audit records of one type written at a revision.
    async fn list_audit_records_at_revision(
        &self,
        descriptor: &AuditedTypeDescriptor,
        revision_id: RevisionId,
    ) -> AppResult<Vec<AuditRecord>>;

    /// Counts shadow rows whose revision no longer exists.
    async fn count_orphaned_audit_records(
        &self,
        descriptor: &AuditedTypeDescriptor,
        revision_table: &SqlIdentifier,
    ) -> AppResult<u64>;

    /// Opens the transaction a retention purge runs in.
    async fn begin_purge(&self) -> AppResult<Box<dyn PurgeTransaction>>;
}

/// Transaction scope for one retention purge.
///
/// Dropping the value without calling [`PurgeTransaction::commit`] rolls back
/// every statement executed through it.
#[async_trait]
pub trait PurgeTransaction: Send {
    /// Deletes shadow rows whose referenced revision is older than `cutoff`.
    ///
    /// The condition is evaluated against the revision table, which must still
    /// hold the referenced revisions.
    async fn delete_audit_records_before(
        &mut self,
        descriptor: &AuditedTypeDescriptor,
        revision_table: &SqlIdentifier,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Deletes revisions older than `cutoff`.
    async fn delete_revisions_before(
        &mut self,
        revision_table: &SqlIdentifier,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Counts shadow rows whose revision is missing, as seen inside the transaction.
    async fn count_orphaned_audit_records(
        &mut self,
        descriptor: &AuditedTypeDescriptor,
        revision_table: &SqlIdentifier,
    ) -> AppResult<u64>;

    /// Commits every statement executed through this transaction.
    async fn commit(self: Box<Self>) -> AppResult<()>;
}
