use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;

use revtrail_application::NewAuditRecord;
use revtrail_core::{AppError, AppResult};
use revtrail_domain::{
    AuditRecord, AuditedTypeDescriptor, EntityKey, Revision, RevisionId, RevisionType,
};

#[derive(Debug, FromRow)]
pub(super) struct RevisionRow {
    id: i64,
    timestamp: DateTime<Utc>,
    username: Option<String>,
}

impl RevisionRow {
    pub(super) fn into_revision(self) -> AppResult<Revision> {
        Revision::new(RevisionId::new(self.id)?, self.timestamp, self.username)
    }
}

/// Builds the JSON document handed to `jsonb_populate_record` for one shadow row.
pub(super) fn shadow_row_payload(record: &NewAuditRecord, revision_id: RevisionId) -> Value {
    let descriptor = &record.descriptor;
    let mut row = record.snapshot.clone();

    for (column, value) in descriptor
        .key_columns()
        .iter()
        .zip(record.entity_key.values())
    {
        row.insert(column.as_str().to_owned(), Value::String(value.clone()));
    }
    row.insert(
        descriptor.revision_field().as_str().to_owned(),
        Value::from(revision_id.as_i64()),
    );
    row.insert(
        descriptor.revision_type_field().as_str().to_owned(),
        Value::String(record.revision_type.as_str().to_owned()),
    );

    Value::Object(row)
}

fn malformed(descriptor: &AuditedTypeDescriptor, detail: &str) -> AppError {
    AppError::Internal(format!(
        "malformed row in '{}': {detail}",
        descriptor.table_name()
    ))
}

/// Splits a `to_jsonb` shadow row into bookkeeping columns and the snapshot.
pub(super) fn audit_record_from_row(
    descriptor: &AuditedTypeDescriptor,
    row: Value,
) -> AppResult<AuditRecord> {
    let Value::Object(mut snapshot) = row else {
        return Err(malformed(descriptor, "expected a JSON object"));
    };

    let mut key_values = Vec::with_capacity(descriptor.key_columns().len());
    for column in descriptor.key_columns() {
        let value = match snapshot.remove(column.as_str()) {
            Some(Value::String(value)) => value,
            Some(Value::Null) | None => {
                return Err(malformed(
                    descriptor,
                    format!("key column '{column}' is empty").as_str(),
                ));
            }
            Some(other) => other.to_string(),
        };
        key_values.push(value);
    }

    let revision_id = snapshot
        .remove(descriptor.revision_field().as_str())
        .and_then(|value| value.as_i64())
        .ok_or_else(|| malformed(descriptor, "revision column is not an integer"))
        .and_then(RevisionId::new)?;

    let revision_type = snapshot
        .remove(descriptor.revision_type_field().as_str())
        .and_then(|value| value.as_str().map(str::to_owned))
        .ok_or_else(|| malformed(descriptor, "revision type column is not text"))?
        .parse::<RevisionType>()?;

    Ok(AuditRecord::new(
        EntityKey::new(key_values)?,
        revision_id,
        revision_type,
        snapshot,
    ))
}
