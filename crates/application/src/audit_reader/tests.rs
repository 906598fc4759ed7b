use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use revtrail_core::{AppError, AppResult, SqlIdentifier};
use revtrail_domain::{
    AuditRecord, AuditedTypeDescriptor, EntityKey, Revision, RevisionId, RevisionType,
};

use crate::audit_ports::{AuditStore, NewRevision, PurgeTransaction, RevisionHistoryQuery};
use crate::{AuditConfiguration, AuditManager};

#[derive(Default)]
struct FakeAuditStore {
    revisions: Mutex<Vec<Revision>>,
    records: Mutex<HashMap<String, Vec<AuditRecord>>>,
    revision_reads: Mutex<usize>,
}

impl FakeAuditStore {
    async fn push(&self, table: &str, key: &str, revision: i64, revision_type: RevisionType, name: &str) {
        let revision_id = revision_id(revision);
        let mut revisions = self.revisions.lock().await;
        if !revisions.iter().any(|stored| stored.id() == revision_id) {
            revisions.push(
                Revision::new(
                    revision_id,
                    Utc::now() - Duration::days(30 - revision),
                    Some("alice".to_owned()),
                )
                .unwrap_or_else(|_| panic!("test revision")),
            );
        }

        let mut snapshot = Map::new();
        snapshot.insert("name".to_owned(), Value::String(name.to_owned()));
        self.records
            .lock()
            .await
            .entry(table.to_owned())
            .or_default()
            .push(AuditRecord::new(
                EntityKey::single(key),
                revision_id,
                revision_type,
                snapshot,
            ));
    }

    async fn forget_records(&self, table: &str) {
        self.records.lock().await.remove(table);
    }
}

#[async_trait]
impl AuditStore for FakeAuditStore {
    async fn record_revision(
        &self,
        _revision_table: &SqlIdentifier,
        _input: NewRevision,
    ) -> AppResult<Revision> {
        Err(AppError::Internal("read-only fake".to_owned()))
    }

    async fn list_revisions(
        &self,
        _revision_table: &SqlIdentifier,
        query: RevisionHistoryQuery,
    ) -> AppResult<Vec<Revision>> {
        *self.revision_reads.lock().await += 1;
        let mut revisions = self.revisions.lock().await.clone();
        revisions.sort_by_key(|revision| std::cmp::Reverse(revision.id()));
        Ok(revisions
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn find_revision(
        &self,
        _revision_table: &SqlIdentifier,
        revision_id: RevisionId,
    ) -> AppResult<Option<Revision>> {
        Ok(self
            .revisions
            .lock()
            .await
            .iter()
            .find(|revision| revision.id() == revision_id)
            .cloned())
    }

    async fn latest_revision_id(
        &self,
        _revision_table: &SqlIdentifier,
    ) -> AppResult<Option<RevisionId>> {
        Ok(self
            .revisions
            .lock()
            .await
            .iter()
            .map(Revision::id)
            .max())
    }

    async fn find_audit_record_at(
        &self,
        descriptor: &AuditedTypeDescriptor,
        entity_key: &EntityKey,
        revision_id: RevisionId,
    ) -> AppResult<Option<AuditRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .get(descriptor.table_name().as_str())
            .and_then(|records| {
                records
                    .iter()
                    .filter(|record| {
                        record.entity_key() == entity_key && record.revision_id() <= revision_id
                    })
                    .max_by_key(|record| record.revision_id())
                    .cloned()
            }))
    }

    async fn list_entity_audit_records(
        &self,
        descriptor: &AuditedTypeDescriptor,
        entity_key: &EntityKey,
    ) -> AppResult<Vec<AuditRecord>> {
        let mut records: Vec<AuditRecord> = self
            .records
            .lock()
            .await
            .get(descriptor.table_name().as_str())
            .map(|records| {
                records
                    .iter()
                    .filter(|record| record.entity_key() == entity_key)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by_key(|record| std::cmp::Reverse(record.revision_id()));
        Ok(records)
    }

    async fn list_audit_records_at_revision(
        &self,
        descriptor: &AuditedTypeDescriptor,
        revision_id: RevisionId,
    ) -> AppResult<Vec<AuditRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .get(descriptor.table_name().as_str())
            .map(|records| {
                records
                    .iter()
                    .filter(|record| record.revision_id() == revision_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count_orphaned_audit_records(
        &self,
        _descriptor: &AuditedTypeDescriptor,
        _revision_table: &SqlIdentifier,
    ) -> AppResult<u64> {
        Ok(0)
    }

    async fn begin_purge(&self) -> AppResult<Box<dyn PurgeTransaction>> {
        Err(AppError::Internal("read-only fake".to_owned()))
    }
}

fn revision_id(value: i64) -> RevisionId {
    RevisionId::new(value).unwrap_or_else(|_| panic!("test revision id"))
}

fn manager() -> AuditManager {
    AuditManager::new(
        AuditConfiguration::builder()
            .audit_type("food_category", "food_category", &["id"])
            .audit_type("cheese_product", "cheese_product", &["id"])
            .build()
            .unwrap_or_else(|error| panic!("test configuration: {error}")),
    )
}

async fn seeded_store() -> Arc<FakeAuditStore> {
    let store = Arc::new(FakeAuditStore::default());
    store
        .push("food_category_audit", "1", 1, RevisionType::Insert, "Food")
        .await;
    store
        .push("cheese_product_audit", "1", 1, RevisionType::Insert, "Parmesan")
        .await;
    store
        .push("cheese_product_audit", "2", 1, RevisionType::Insert, "Cheddar")
        .await;
    store
        .push("cheese_product_audit", "1", 2, RevisionType::Update, "Parmigiano")
        .await;
    store
        .push("cheese_product_audit", "1", 3, RevisionType::Delete, "Parmigiano")
        .await;
    store
        .push("cheese_product_audit", "2", 4, RevisionType::Update, "Cheddar-0")
        .await;
    store
}

fn name_of(record: &AuditRecord) -> Option<&str> {
    record.field("name").and_then(Value::as_str)
}

#[tokio::test]
async fn revision_history_is_newest_first_and_bounded() {
    let store = seeded_store().await;
    let reader = manager().create_audit_reader(store.clone());

    let Ok(history) = reader.find_revision_history(3).await else {
        panic!("history must load");
    };
    let ids: Vec<i64> = history.iter().map(|revision| revision.id().as_i64()).collect();
    assert_eq!(ids, vec![4, 3, 2]);

    let Ok(page) = reader.find_revision_history_page(3, 3).await else {
        panic!("history page must load");
    };
    let ids: Vec<i64> = page.iter().map(|revision| revision.id().as_i64()).collect();
    assert_eq!(ids, vec![1]);

    assert!(reader
        .find_revision_history(0)
        .await
        .is_ok_and(|history| history.is_empty()));
}

#[tokio::test]
async fn revision_history_is_never_cached() {
    let store = seeded_store().await;
    let reader = manager().create_audit_reader(store.clone());

    assert!(reader.find_revision_history(10).await.is_ok());
    assert!(reader.find_revision_history(10).await.is_ok());
    assert_eq!(*store.revision_reads.lock().await, 2);
}

#[tokio::test]
async fn find_returns_state_as_of_revision() {
    let store = seeded_store().await;
    let reader = manager().create_audit_reader(store);
    let parmesan = EntityKey::single("1");

    let at_first = reader.find("cheese_product", &parmesan, revision_id(1)).await;
    assert_eq!(at_first.as_ref().ok().and_then(name_of), Some("Parmesan"));

    let at_second = reader.find("cheese_product", &parmesan, revision_id(2)).await;
    assert_eq!(at_second.as_ref().ok().and_then(name_of), Some("Parmigiano"));

    let after_delete = reader.find("cheese_product", &parmesan, revision_id(4)).await;
    assert!(matches!(after_delete, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn find_rejects_unregistered_types_and_unknown_entities() {
    let store = seeded_store().await;
    let reader = manager().create_audit_reader(store);

    let unregistered = reader
        .find("invoice", &EntityKey::single("1"), revision_id(1))
        .await;
    assert!(matches!(unregistered, Err(AppError::NotFound(_))));

    let unknown = reader
        .find("cheese_product", &EntityKey::single("99"), revision_id(4))
        .await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn cached_snapshots_survive_until_cache_is_cleared() {
    let store = seeded_store().await;
    let reader = manager().create_audit_reader(store.clone());
    let cheddar = EntityKey::single("2");

    assert!(reader.find("cheese_product", &cheddar, revision_id(4)).await.is_ok());
    assert_eq!(reader.cached_entity_count().await, 1);

    store.forget_records("cheese_product_audit").await;
    assert!(reader.find("cheese_product", &cheddar, revision_id(4)).await.is_ok());

    reader.clear_entity_cache().await;
    reader.clear_entity_cache().await;
    assert_eq!(reader.cached_entity_count().await, 0);

    let after_clear = reader.find("cheese_product", &cheddar, revision_id(4)).await;
    assert!(matches!(after_clear, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn readers_own_separate_caches() {
    let store = seeded_store().await;
    let manager = manager();
    let first = manager.create_audit_reader(store.clone());
    let second = manager.create_audit_reader(store);

    assert!(first
        .find("food_category", &EntityKey::single("1"), revision_id(1))
        .await
        .is_ok());
    assert_eq!(first.cached_entity_count().await, 1);
    assert_eq!(second.cached_entity_count().await, 0);
    assert!(Arc::ptr_eq(first.configuration(), second.configuration()));
}

#[tokio::test]
async fn entity_history_and_revisions_are_newest_first() {
    let store = seeded_store().await;
    let reader = manager().create_audit_reader(store);
    let parmesan = EntityKey::single("1");

    let Ok(history) = reader.find_entity_history("cheese_product", &parmesan).await else {
        panic!("entity history must load");
    };
    let kinds: Vec<RevisionType> = history.iter().map(AuditRecord::revision_type).collect();
    assert_eq!(
        kinds,
        vec![RevisionType::Delete, RevisionType::Update, RevisionType::Insert]
    );

    let Ok(revisions) = reader.find_revisions("cheese_product", &parmesan).await else {
        panic!("entity revisions must load");
    };
    let ids: Vec<i64> = revisions.iter().map(|revision| revision.id().as_i64()).collect();
    assert_eq!(ids, vec![3, 2, 1]);
    assert!(revisions.iter().all(|revision| revision.actor() == Some("alice")));
}

#[tokio::test]
async fn changed_entities_follow_registration_order() {
    let store = seeded_store().await;
    let reader = manager().create_audit_reader(store);

    let Ok(changed) = reader.find_entities_changed_at_revision(revision_id(1)).await else {
        panic!("changed entities must load");
    };
    let summary: Vec<(&str, Option<&str>)> = changed
        .iter()
        .map(|entity| (entity.type_name.as_str(), name_of(&entity.record)))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("food_category", Some("Food")),
            ("cheese_product", Some("Parmesan")),
            ("cheese_product", Some("Cheddar")),
        ]
    );

    let missing = reader.find_entities_changed_at_revision(revision_id(42)).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    assert_eq!(
        reader.current_revision().await.ok().flatten(),
        Some(revision_id(4))
    );
}
