use std::fmt::{Display, Formatter};
use std::str::FromStr;

use revtrail_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::RevisionId;

/// Kind of change captured by an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionType {
    /// Entity was created.
    Insert,
    /// Entity fields changed.
    Update,
    /// Entity was removed.
    Delete,
}

impl RevisionType {
    /// Returns the stable storage value for the change kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INS",
            Self::Update => "UPD",
            Self::Delete => "DEL",
        }
    }
}

impl FromStr for RevisionType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "INS" => Ok(Self::Insert),
            "UPD" => Ok(Self::Update),
            "DEL" => Ok(Self::Delete),
            _ => Err(AppError::Validation(format!(
                "unknown revision type '{value}'"
            ))),
        }
    }
}

/// Primary key of an audited entity, one value per key column, copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey(Vec<String>);

impl EntityKey {
    /// Creates a key from its column values in key column order.
    pub fn new(values: Vec<String>) -> AppResult<Self> {
        if values.is_empty() {
            return Err(AppError::Validation(
                "entity key must contain at least one value".to_owned(),
            ));
        }

        Ok(Self(values))
    }

    /// Creates a single-column key.
    #[must_use]
    pub fn single(value: impl Into<String>) -> Self {
        Self(vec![value.into()])
    }

    /// Returns the key column values.
    #[must_use]
    pub fn values(&self) -> &[String] {
        self.0.as_slice()
    }

    /// Returns the number of key columns this key covers.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.0.len()
    }
}

impl Display for EntityKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.join(", ").as_str())
    }
}

/// Immutable snapshot of one entity as of one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    entity_key: EntityKey,
    revision_id: RevisionId,
    revision_type: RevisionType,
    snapshot: Map<String, Value>,
}

impl AuditRecord {
    /// Creates an audit record.
    #[must_use]
    pub fn new(
        entity_key: EntityKey,
        revision_id: RevisionId,
        revision_type: RevisionType,
        snapshot: Map<String, Value>,
    ) -> Self {
        Self {
            entity_key,
            revision_id,
            revision_type,
            snapshot,
        }
    }

    /// Returns the audited entity key.
    #[must_use]
    pub fn entity_key(&self) -> &EntityKey {
        &self.entity_key
    }

    /// Returns the owning revision.
    #[must_use]
    pub fn revision_id(&self) -> RevisionId {
        self.revision_id
    }

    /// Returns the change kind.
    #[must_use]
    pub fn revision_type(&self) -> RevisionType {
        self.revision_type
    }

    /// Returns the persisted field values at this revision.
    #[must_use]
    pub fn snapshot(&self) -> &Map<String, Value> {
        &self.snapshot
    }

    /// Returns a single field value from the snapshot.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.snapshot.get(name)
    }

    /// Returns true when this record marks the entity as removed.
    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.revision_type == RevisionType::Delete
    }
}
