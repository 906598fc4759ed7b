use std::collections::HashMap;

use serde_json::{Map, Value};
use sqlx::PgPool;

use revtrail_core::{AppError, AppResult};
use revtrail_domain::AuditedTypeDescriptor;

/// Column names and SQL types of one shadow table, read from the catalog.
#[derive(Debug)]
pub(super) struct ShadowColumns {
    types: HashMap<String, String>,
}

impl ShadowColumns {
    pub(super) async fn load(
        pool: &PgPool,
        descriptor: &AuditedTypeDescriptor,
    ) -> AppResult<Self> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT attribute.attname::TEXT, format_type(attribute.atttypid, attribute.atttypmod)
            FROM pg_attribute attribute
            WHERE attribute.attrelid = $1::regclass
                AND attribute.attnum > 0
                AND NOT attribute.attisdropped
            "#,
        )
        .bind(descriptor.table_name().quoted())
        .fetch_all(pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to read columns of shadow table '{}': {error}",
                descriptor.table_name()
            ))
        })?;

        let columns = Self {
            types: rows.into_iter().collect(),
        };

        for column in descriptor
            .key_columns()
            .iter()
            .chain([descriptor.revision_field(), descriptor.revision_type_field()])
        {
            if !columns.types.contains_key(column.as_str()) {
                return Err(AppError::Configuration(format!(
                    "shadow table '{}' has no column '{column}'",
                    descriptor.table_name()
                )));
            }
        }

        Ok(columns)
    }

    /// Equality predicate over the key columns, casting each text parameter to
    /// the column type so the primary key index stays usable.
    pub(super) fn key_predicate(
        &self,
        descriptor: &AuditedTypeDescriptor,
        first_parameter: usize,
    ) -> String {
        descriptor
            .key_columns()
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let column_type = self
                    .types
                    .get(column.as_str())
                    .map_or("TEXT", String::as_str);
                format!(
                    "shadow.{} = CAST(${} AS {column_type})",
                    column.quoted(),
                    first_parameter + index
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Rejects snapshot fields the shadow table cannot store.
    pub(super) fn check_snapshot(
        &self,
        descriptor: &AuditedTypeDescriptor,
        snapshot: &Map<String, Value>,
    ) -> AppResult<()> {
        let mut unknown: Vec<&str> = snapshot
            .keys()
            .map(String::as_str)
            .filter(|field| !self.types.contains_key(*field))
            .collect();

        if unknown.is_empty() {
            return Ok(());
        }

        unknown.sort_unstable();
        Err(AppError::Validation(format!(
            "shadow table '{}' of '{}' has no column for field(s): {}",
            descriptor.table_name(),
            descriptor.type_name(),
            unknown.join(", ")
        )))
    }
}
