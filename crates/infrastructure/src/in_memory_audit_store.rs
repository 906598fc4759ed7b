use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use revtrail_application::{AuditStore, NewRevision, PurgeTransaction, RevisionHistoryQuery};
use revtrail_core::{AppError, AppResult, SqlIdentifier};
use revtrail_domain::{AuditRecord, AuditedTypeDescriptor, EntityKey, Revision, RevisionId};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};


#[derive(Debug, Clone, Default)]
struct AuditState {
    last_revision_id: i64,
    revisions: BTreeMap<RevisionId, Revision>,
    shadow_tables: HashMap<String, Vec<AuditRecord>>,
}

impl AuditState {
    fn delete_audit_records_before(&mut self, table: &str, cutoff: DateTime<Utc>) -> u64 {
        let Some(records) = self.shadow_tables.get_mut(table) else {
            return 0;
        };

        let before = records.len();
        let revisions = &self.revisions;
        records.retain(|record| {
            revisions
                .get(&record.revision_id())
                .is_none_or(|revision| !revision.is_before(cutoff))
        });

        (before - records.len()) as u64
    }

    fn delete_revisions_before(&mut self, cutoff: DateTime<Utc>) -> u64 {
        let before = self.revisions.len();
        self.revisions.retain(|_, revision| !revision.is_before(cutoff));
        (before - self.revisions.len()) as u64
    }

    fn count_orphans(&self, table: &str) -> u64 {
        self.shadow_tables
            .get(table)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| !self.revisions.contains_key(&record.revision_id()))
                    .count() as u64
            })
            .unwrap_or(0)
    }

    fn records(&self, table: &str) -> impl Iterator<Item = &AuditRecord> {
        self.shadow_tables.get(table).into_iter().flatten()
    }
}

/// In-memory audit store.
///
/// A purge transaction holds the write lock for its whole lifetime and works on
/// a staged copy that only replaces the live state on commit.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    state: Arc<RwLock<AuditState>>,
}

impl InMemoryAuditStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows currently held in a shadow table.
    pub async fn audit_record_count(&self, table: &str) -> usize {
        self.state.read().await.records(table).count()
    }

    /// Returns the number of revisions currently held.
    pub async fn revision_count(&self) -> usize {
        self.state.read().await.revisions.len()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn record_revision(
        &self,
        _revision_table: &SqlIdentifier,
        input: NewRevision,
    ) -> AppResult<Revision> {
        let mut state = self.state.write().await;

        let revision_id = RevisionId::new(state.last_revision_id + 1)?;
        let revision = Revision::new(
            revision_id,
            input.timestamp.unwrap_or_else(Utc::now),
            input.actor,
        )?;

        let mut staged: HashMap<String, Vec<AuditRecord>> = HashMap::new();
        for record in input.records {
            let table = record.descriptor.table_name().as_str().to_owned();
            let rows = staged.entry(table.clone()).or_default();
            if rows
                .iter()
                .any(|existing| existing.entity_key() == &record.entity_key)
            {
                return Err(AppError::Conflict(format!(
                    "'{}' ({}) appears twice in revision {revision_id}",
                    record.descriptor.type_name(),
                    record.entity_key
                )));
            }

            rows.push(AuditRecord::new(
                record.entity_key,
                revision_id,
                record.revision_type,
                record.snapshot,
            ));
        }

        state.last_revision_id = revision_id.as_i64();
        state.revisions.insert(revision_id, revision.clone());
        for (table, rows) in staged {
            state.shadow_tables.entry(table).or_default().extend(rows);
        }

        Ok(revision)
    }

    async fn list_revisions(
        &self,
        _revision_table: &SqlIdentifier,
        query: RevisionHistoryQuery,
    ) -> AppResult<Vec<Revision>> {
        Ok(self
            .state
            .read()
            .await
            .revisions
            .values()
            .rev()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn find_revision(
        &self,
        _revision_table: &SqlIdentifier,
        revision_id: RevisionId,
    ) -> AppResult<Option<Revision>> {
        Ok(self.state.read().await.revisions.get(&revision_id).cloned())
    }

    async fn latest_revision_id(
        &self,
        _revision_table: &SqlIdentifier,
    ) -> AppResult<Option<RevisionId>> {
        Ok(self
            .state
            .read()
            .await
            .revisions
            .keys()
            .next_back()
            .copied())
    }

    async fn find_audit_record_at(
        &self,
        descriptor: &AuditedTypeDescriptor,
        entity_key: &EntityKey,
        revision_id: RevisionId,
    ) -> AppResult<Option<AuditRecord>> {
        Ok(self
            .state
            .read()
            .await
            .records(descriptor.table_name().as_str())
            .filter(|record| {
                record.entity_key() == entity_key && record.revision_id() <= revision_id
            })
            .max_by_key(|record| record.revision_id())
            .cloned())
    }

    async fn list_entity_audit_records(
        &self,
        descriptor: &AuditedTypeDescriptor,
        entity_key: &EntityKey,
    ) -> AppResult<Vec<AuditRecord>> {
        let mut records: Vec<AuditRecord> = self
            .state
            .read()
            .await
            .records(descriptor.table_name().as_str())
            .filter(|record| record.entity_key() == entity_key)
            .cloned()
            .collect();
        records.sort_by(|left, right| right.revision_id().cmp(&left.revision_id()));
        Ok(records)
    }

    async fn list_audit_records_at_revision(
        &self,
        descriptor: &AuditedTypeDescriptor,
        revision_id: RevisionId,
    ) -> AppResult<Vec<AuditRecord>> {
        Ok(self
            .state
            .read()
            .await
            .records(descriptor.table_name().as_str())
            .filter(|record| record.revision_id() == revision_id)
            .cloned()
            .collect())
    }

    async fn count_orphaned_audit_records(
        &self,
        descriptor: &AuditedTypeDescriptor,
        _revision_table: &SqlIdentifier,
    ) -> AppResult<u64> {
        Ok(self
            .state
            .read()
            .await
            .count_orphans(descriptor.table_name().as_str()))
    }

    async fn begin_purge(&self) -> AppResult<Box<dyn PurgeTransaction>> {
        let guard = Arc::clone(&self.state).write_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryPurgeTransaction { guard, staged }))
    }
}

struct InMemoryPurgeTransaction {
    guard: OwnedRwLockWriteGuard<AuditState>,
    staged: AuditState,
}

#[async_trait]
impl PurgeTransaction for InMemoryPurgeTransaction {
    async fn delete_audit_records_before(
        &mut self,
        descriptor: &AuditedTypeDescriptor,
        _revision_table: &SqlIdentifier,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        Ok(self
            .staged
            .delete_audit_records_before(descriptor.table_name().as_str(), cutoff))
    }

    async fn delete_revisions_before(
        &mut self,
        _revision_table: &SqlIdentifier,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        Ok(self.staged.delete_revisions_before(cutoff))
    }

    async fn count_orphaned_audit_records(
        &mut self,
        descriptor: &AuditedTypeDescriptor,
        _revision_table: &SqlIdentifier,
    ) -> AppResult<u64> {
        Ok(self.staged.count_orphans(descriptor.table_name().as_str()))
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let Self { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
