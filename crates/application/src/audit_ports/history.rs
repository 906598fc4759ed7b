use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use revtrail_domain::{AuditedTypeDescriptor, EntityKey, RevisionType};

/// Query parameters for revision history listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionHistoryQuery {
    /// Maximum rows returned.
    pub limit: usize,
    /// Number of rows skipped for offset pagination.
    pub offset: usize,
}

/// One shadow row to insert alongside a new revision.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditRecord {
    /// Shadow table layout of the changed entity.
    pub descriptor: AuditedTypeDescriptor,
    /// Primary key of the changed entity.
    pub entity_key: EntityKey,
    /// Change kind.
    pub revision_type: RevisionType,
    /// Persisted field values after the change.
    pub snapshot: Map<String, Value>,
}

/// Input payload for recording a revision with its audit records.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRevision {
    /// Identity that produced the change.
    pub actor: Option<String>,
    /// Revision timestamp. The store assigns the current time when absent.
    pub timestamp: Option<DateTime<Utc>>,
    /// Audit records written in the same transaction as the revision.
    pub records: Vec<NewAuditRecord>,
}
