use std::collections::HashMap;

use revtrail_domain::{AuditRecord, EntityKey, RevisionId};

type CacheKey = (String, EntityKey, RevisionId);

/// Memoised entity snapshots owned by a single reader.
#[derive(Debug, Default)]
pub struct EntityCache {
    entries: HashMap<CacheKey, AuditRecord>,
}

impl EntityCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the snapshot resolved for `(type_name, entity_key, revision_id)`.
    #[must_use]
    pub fn get(
        &self,
        type_name: &str,
        entity_key: &EntityKey,
        revision_id: RevisionId,
    ) -> Option<&AuditRecord> {
        self.entries
            .get(&(type_name.to_owned(), entity_key.clone(), revision_id))
    }

    /// Stores the snapshot resolved for `(type_name, entity_key, revision_id)`.
    pub fn put(
        &mut self,
        type_name: &str,
        entity_key: EntityKey,
        revision_id: RevisionId,
        record: AuditRecord,
    ) {
        self.entries
            .insert((type_name.to_owned(), entity_key, revision_id), record);
    }

    /// Drops every cached snapshot.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the number of cached snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
