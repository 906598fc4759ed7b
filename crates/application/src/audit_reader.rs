use std::sync::Arc;

use tokio::sync::RwLock;

use revtrail_core::{AppError, AppResult};
use revtrail_domain::{AuditRecord, EntityKey, Revision, RevisionId};

use crate::audit_configuration::AuditConfiguration;
use crate::audit_ports::{AuditStore, RevisionHistoryQuery};
use crate::entity_cache::EntityCache;

#[cfg(test)]
mod tests;

/// Audit record of one entity, tagged with its audited type.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedEntity {
    /// Audited type identifier.
    pub type_name: String,
    /// Shadow row written at the revision.
    pub record: AuditRecord,
}

/// Read-only queries over revision history and entity snapshots.
///
/// Revision listings always reach the store. Entity snapshots resolved by
/// [`AuditReader::find`] are memoised until [`AuditReader::clear_entity_cache`].
pub struct AuditReader {
    store: Arc<dyn AuditStore>,
    configuration: Arc<AuditConfiguration>,
    cache: RwLock<EntityCache>,
}

impl AuditReader {
    /// Creates a reader bound to a persistence context and a shared configuration.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>, configuration: Arc<AuditConfiguration>) -> Self {
        Self {
            store,
            configuration,
            cache: RwLock::new(EntityCache::new()),
        }
    }

    /// Returns the configuration this reader resolves tables with.
    #[must_use]
    pub fn configuration(&self) -> &Arc<AuditConfiguration> {
        &self.configuration
    }

    /// Returns up to `limit` revisions, newest first.
    pub async fn find_revision_history(&self, limit: usize) -> AppResult<Vec<Revision>> {
        self.find_revision_history_page(limit, 0).await
    }

    /// Returns one page of revision history, newest first.
    pub async fn find_revision_history_page(
        &self,
        limit: usize,
        offset: usize,
    ) -> AppResult<Vec<Revision>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.store
            .list_revisions(
                self.configuration.revision_table_name(),
                RevisionHistoryQuery { limit, offset },
            )
            .await
    }

    /// Returns one revision.
    pub async fn find_revision(&self, revision_id: RevisionId) -> AppResult<Revision> {
        self.store
            .find_revision(self.configuration.revision_table_name(), revision_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("revision {revision_id} does not exist")))
    }

    /// Returns the most recent revision identifier, if any revision exists.
    pub async fn current_revision(&self) -> AppResult<Option<RevisionId>> {
        self.store
            .latest_revision_id(self.configuration.revision_table_name())
            .await
    }

    /// Returns the state of an entity as of `revision_id`.
    ///
    /// Fails with `NotFound` when the entity did not exist at that revision or
    /// its latest change up to that revision was a delete.
    pub async fn find(
        &self,
        type_name: &str,
        entity_key: &EntityKey,
        revision_id: RevisionId,
    ) -> AppResult<AuditRecord> {
        if let Some(record) = self
            .cache
            .read()
            .await
            .get(type_name, entity_key, revision_id)
        {
            return Ok(record.clone());
        }

        let descriptor = self.configuration.audited_type(type_name)?;
        descriptor.validate_key(entity_key)?;

        let record = self
            .store
            .find_audit_record_at(descriptor, entity_key, revision_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "no revision of '{type_name}' ({entity_key}) exists at or before revision {revision_id}"
                ))
            })?;

        if record.is_delete() {
            return Err(AppError::NotFound(format!(
                "'{type_name}' ({entity_key}) was deleted at revision {}",
                record.revision_id()
            )));
        }

        self.cache.write().await.put(
            type_name,
            entity_key.clone(),
            revision_id,
            record.clone(),
        );

        Ok(record)
    }

    /// Returns the revisions in which an entity changed, newest first.
    pub async fn find_revisions(
        &self,
        type_name: &str,
        entity_key: &EntityKey,
    ) -> AppResult<Vec<Revision>> {
        let records = self.find_entity_history(type_name, entity_key).await?;
        let revision_table = self.configuration.revision_table_name();

        let mut revisions = Vec::with_capacity(records.len());
        for record in records {
            let revision = self
                .store
                .find_revision(revision_table, record.revision_id())
                .await?
                .ok_or_else(|| {
                    AppError::Integrity(format!(
                        "audit record of '{type_name}' ({entity_key}) references missing revision {}",
                        record.revision_id()
                    ))
                })?;
            revisions.push(revision);
        }

        Ok(revisions)
    }

    /// Returns every audit record of an entity, newest first.
    pub async fn find_entity_history(
        &self,
        type_name: &str,
        entity_key: &EntityKey,
    ) -> AppResult<Vec<AuditRecord>> {
        let descriptor = self.configuration.audited_type(type_name)?;
        descriptor.validate_key(entity_key)?;

        self.store
            .list_entity_audit_records(descriptor, entity_key)
            .await
    }

    /// Returns every entity changed at a revision, in audited type registration order.
    pub async fn find_entities_changed_at_revision(
        &self,
        revision_id: RevisionId,
    ) -> AppResult<Vec<ChangedEntity>> {
        self.find_revision(revision_id).await?;

        let mut changed = Vec::new();
        for descriptor in self.configuration.audited_types() {
            let records = self
                .store
                .list_audit_records_at_revision(descriptor, revision_id)
                .await?;
            changed.extend(records.into_iter().map(|record| ChangedEntity {
                type_name: descriptor.type_name().to_owned(),
                record,
            }));
        }

        Ok(changed)
    }

    /// Drops memoised snapshots so later queries observe committed changes.
    pub async fn clear_entity_cache(&self) {
        self.cache.write().await.clear();
    }

    /// Returns the number of memoised snapshots.
    pub async fn cached_entity_count(&self) -> usize {
        self.cache.read().await.len()
    }
}
