use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use revtrail_core::{AppError, AppResult};
use revtrail_domain::{EntityKey, Revision, RevisionType};

use crate::audit_configuration::AuditConfiguration;
use crate::audit_ports::{AuditStore, NewAuditRecord, NewRevision};

/// One entity change captured by a write-side integration.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityChange {
    /// Audited type identifier.
    pub type_name: String,
    /// Primary key of the changed entity.
    pub entity_key: EntityKey,
    /// Change kind.
    pub revision_type: RevisionType,
    /// Persisted field values after the change.
    pub snapshot: Map<String, Value>,
}

/// Records revisions produced by write-side integrations.
///
/// The writer persists snapshots it is handed; computing field diffs is the
/// caller's concern.
pub struct AuditWriter {
    store: Arc<dyn AuditStore>,
    configuration: Arc<AuditConfiguration>,
}

impl AuditWriter {
    /// Creates a writer bound to a persistence context and a shared configuration.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>, configuration: Arc<AuditConfiguration>) -> Self {
        Self {
            store,
            configuration,
        }
    }

    /// Records a revision stamped with the current time.
    pub async fn record(
        &self,
        actor: Option<&str>,
        changes: Vec<EntityChange>,
    ) -> AppResult<Revision> {
        self.record_revision(actor, None, changes).await
    }

    /// Records a revision with an explicit timestamp, used for imports and backfills.
    pub async fn record_at(
        &self,
        actor: Option<&str>,
        timestamp: DateTime<Utc>,
        changes: Vec<EntityChange>,
    ) -> AppResult<Revision> {
        self.record_revision(actor, Some(timestamp), changes).await
    }

    async fn record_revision(
        &self,
        actor: Option<&str>,
        timestamp: Option<DateTime<Utc>>,
        changes: Vec<EntityChange>,
    ) -> AppResult<Revision> {
        if changes.is_empty() {
            return Err(AppError::Validation(
                "a revision must change at least one audited entity".to_owned(),
            ));
        }

        let mut records = Vec::with_capacity(changes.len());
        for change in changes {
            let descriptor = self.configuration.audited_type(change.type_name.as_str())?;
            descriptor.validate_key(&change.entity_key)?;

            if let Some(column) = change
                .snapshot
                .keys()
                .find(|column| descriptor.is_bookkeeping_column(column.as_str()))
            {
                return Err(AppError::Validation(format!(
                    "snapshot of '{}' must not carry bookkeeping column '{column}'",
                    change.type_name
                )));
            }

            records.push(NewAuditRecord {
                descriptor: descriptor.clone(),
                entity_key: change.entity_key,
                revision_type: change.revision_type,
                snapshot: change.snapshot,
            });
        }

        self.store
            .record_revision(
                self.configuration.revision_table_name(),
                NewRevision {
                    actor: actor.map(str::to_owned),
                    timestamp,
                    records,
                },
            )
            .await
    }
}
