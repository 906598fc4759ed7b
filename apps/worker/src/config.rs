use std::env;
use std::time::Duration;

use revtrail_application::AuditConfiguration;
use revtrail_core::{AppError, AppResult};
use revtrail_domain::parse_retention_months;


/// One `AUDITED_TYPES` entry: `type=table:key1+key2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditedTypeSpec {
    pub type_name: String,
    pub base_table: String,
    pub key_columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub retention_months: Option<u32>,
    pub table_prefix: Option<String>,
    pub table_suffix: Option<String>,
    pub revision_table: Option<String>,
    pub revision_field: Option<String>,
    pub revision_type_field: Option<String>,
    pub audited_types: Vec<AuditedTypeSpec>,
    pub purge_interval: Duration,
    pub purge_once: bool,
}

impl WorkerConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let database_url = required(&lookup, "DATABASE_URL")?;
        let retention_months = match lookup("AUDIT_RETENTION_MONTHS") {
            Some(value) => parse_retention_months(value.as_str())?,
            None => None,
        };
        let audited_types = parse_audited_types(required(&lookup, "AUDITED_TYPES")?.as_str())?;
        let purge_interval_seconds = parse_u64(&lookup, "PURGE_INTERVAL_SECONDS", 3600)?;
        let purge_once = parse_bool(&lookup, "PURGE_ONCE", false)?;

        if purge_interval_seconds == 0 {
            return Err(AppError::Validation(
                "PURGE_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            retention_months,
            table_prefix: lookup("AUDIT_TABLE_PREFIX"),
            table_suffix: lookup("AUDIT_TABLE_SUFFIX"),
            revision_table: optional(&lookup, "AUDIT_REVISION_TABLE"),
            revision_field: optional(&lookup, "AUDIT_REVISION_FIELD"),
            revision_type_field: optional(&lookup, "AUDIT_REVISION_TYPE_FIELD"),
            audited_types,
            purge_interval: Duration::from_secs(purge_interval_seconds),
            purge_once,
        })
    }

    /// Builds the validated audit configuration described by the environment.
    pub fn audit_configuration(&self) -> AppResult<AuditConfiguration> {
        let mut builder = AuditConfiguration::builder()
            .retention_period_months(self.retention_months.map(i64::from));

        if let Some(prefix) = &self.table_prefix {
            builder = builder.table_prefix(prefix.as_str());
        }
        if let Some(suffix) = &self.table_suffix {
            builder = builder.table_suffix(suffix.as_str());
        }
        if let Some(table) = &self.revision_table {
            builder = builder.revision_table_name(table.as_str());
        }
        if let Some(field) = &self.revision_field {
            builder = builder.revision_field_name(field.as_str());
        }
        if let Some(field) = &self.revision_type_field {
            builder = builder.revision_type_field_name(field.as_str());
        }

        for spec in &self.audited_types {
            let key_columns: Vec<&str> = spec.key_columns.iter().map(String::as_str).collect();
            builder = builder.audit_type(
                spec.type_name.as_str(),
                spec.base_table.as_str(),
                key_columns.as_slice(),
            );
        }

        builder.build()
    }
}

/// Parses `type=table:key1+key2,type2=table2:id`.
pub fn parse_audited_types(raw: &str) -> AppResult<Vec<AuditedTypeSpec>> {
    let specs = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_audited_type)
        .collect::<AppResult<Vec<_>>>()?;

    if specs.is_empty() {
        return Err(AppError::Configuration(
            "AUDITED_TYPES must name at least one audited type".to_owned(),
        ));
    }

    Ok(specs)
}

fn parse_audited_type(entry: &str) -> AppResult<AuditedTypeSpec> {
    let malformed = || {
        AppError::Configuration(format!(
            "invalid AUDITED_TYPES entry '{entry}', expected 'type=table:key1+key2'"
        ))
    };

    let (type_name, mapping) = entry.split_once('=').ok_or_else(malformed)?;
    let (base_table, keys) = mapping.split_once(':').ok_or_else(malformed)?;
    let key_columns: Vec<String> = keys
        .split('+')
        .map(|key| key.trim().to_owned())
        .filter(|key| !key.is_empty())
        .collect();

    let type_name = type_name.trim();
    let base_table = base_table.trim();
    if type_name.is_empty() || base_table.is_empty() || key_columns.is_empty() {
        return Err(malformed());
    }

    Ok(AuditedTypeSpec {
        type_name: type_name.to_owned(),
        base_table: base_table.to_owned(),
        key_columns,
    })
}

pub fn required_env(name: &str) -> AppResult<String> {
    required(&|key: &str| env::var(key).ok(), name)
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> AppResult<String> {
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> AppResult<u64> {
    match lookup(name) {
        Some(value) => value.trim().parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: bool,
) -> AppResult<bool> {
    match lookup(name) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            _ => Err(AppError::Validation(format!(
                "invalid {name} value '{value}', expected true or false"
            ))),
        },
        None => Ok(default),
    }
}
