use std::collections::HashSet;

use revtrail_core::{AppError, AppResult, NonEmptyString, SqlIdentifier};
use serde::{Deserialize, Serialize};

use crate::EntityKey;

/// Shadow-table layout for one audited entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditedTypeDescriptor {
    type_name: NonEmptyString,
    table_name: SqlIdentifier,
    key_columns: Vec<SqlIdentifier>,
    revision_field: SqlIdentifier,
    revision_type_field: SqlIdentifier,
}

impl AuditedTypeDescriptor {
    /// Creates a descriptor, rejecting key columns that shadow the revision columns.
    pub fn new(
        type_name: impl Into<String>,
        table_name: SqlIdentifier,
        key_columns: Vec<SqlIdentifier>,
        revision_field: SqlIdentifier,
        revision_type_field: SqlIdentifier,
    ) -> AppResult<Self> {
        let type_name = NonEmptyString::new(type_name)?;

        if key_columns.is_empty() {
            return Err(AppError::Configuration(format!(
                "audited type '{}' must declare at least one key column",
                type_name.as_str()
            )));
        }

        if revision_field == revision_type_field {
            return Err(AppError::Configuration(format!(
                "revision field and revision type field must differ, both are '{revision_field}'"
            )));
        }

        let mut seen = HashSet::new();
        for column in &key_columns {
            if !seen.insert(column.as_str()) {
                return Err(AppError::Configuration(format!(
                    "audited type '{}' repeats key column '{column}'",
                    type_name.as_str()
                )));
            }

            if column == &revision_field || column == &revision_type_field {
                return Err(AppError::Configuration(format!(
                    "key column '{column}' of audited type '{}' collides with a revision column",
                    type_name.as_str()
                )));
            }
        }

        Ok(Self {
            type_name,
            table_name,
            key_columns,
            revision_field,
            revision_type_field,
        })
    }

    /// Returns the audited type identifier.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.type_name.as_str()
    }

    /// Returns the shadow table name.
    #[must_use]
    pub fn table_name(&self) -> &SqlIdentifier {
        &self.table_name
    }

    /// Returns the primary key columns copied from the audited table.
    #[must_use]
    pub fn key_columns(&self) -> &[SqlIdentifier] {
        self.key_columns.as_slice()
    }

    /// Returns the column referencing the owning revision.
    #[must_use]
    pub fn revision_field(&self) -> &SqlIdentifier {
        &self.revision_field
    }

    /// Returns the change-kind discriminator column.
    #[must_use]
    pub fn revision_type_field(&self) -> &SqlIdentifier {
        &self.revision_type_field
    }

    /// Checks that a key supplies one value per key column.
    pub fn validate_key(&self, key: &EntityKey) -> AppResult<()> {
        if key.arity() != self.key_columns.len() {
            return Err(AppError::Validation(format!(
                "audited type '{}' expects {} key value(s), got {}",
                self.type_name.as_str(),
                self.key_columns.len(),
                key.arity()
            )));
        }

        Ok(())
    }

    /// Returns true when the column holds key or revision bookkeeping instead of a snapshot field.
    #[must_use]
    pub fn is_bookkeeping_column(&self, column: &str) -> bool {
        column == self.revision_field.as_str()
            || column == self.revision_type_field.as_str()
            || self.key_columns.iter().any(|key| key.as_str() == column)
    }
}
