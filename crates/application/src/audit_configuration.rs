use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use revtrail_core::{AppError, AppResult, SqlIdentifier};
use revtrail_domain::{
    AuditedTypeDescriptor, parse_retention_months, validate_retention_months,
};

/// Stored in the retention cell when no retention period is configured.
const UNLIMITED_RETENTION: i64 = -1;

/// Validated audit trail settings shared by readers, writers and purgers.
///
/// The audited type registry is fixed once built. Only the retention period can
/// change afterwards, through a validating setter.
#[derive(Debug)]
pub struct AuditConfiguration {
    table_prefix: String,
    table_suffix: String,
    revision_table_name: SqlIdentifier,
    revision_field_name: SqlIdentifier,
    revision_type_field_name: SqlIdentifier,
    audited_types: Vec<AuditedTypeDescriptor>,
    type_index: HashMap<String, usize>,
    retention_period_months: AtomicI64,
}

impl AuditConfiguration {
    /// Starts a builder populated with default naming.
    #[must_use]
    pub fn builder() -> AuditConfigurationBuilder {
        AuditConfigurationBuilder::default()
    }

    /// Returns the prefix prepended to audited table names.
    #[must_use]
    pub fn table_prefix(&self) -> &str {
        self.table_prefix.as_str()
    }

    /// Returns the suffix appended to audited table names.
    #[must_use]
    pub fn table_suffix(&self) -> &str {
        self.table_suffix.as_str()
    }

    /// Returns the revision table name.
    #[must_use]
    pub fn revision_table_name(&self) -> &SqlIdentifier {
        &self.revision_table_name
    }

    /// Returns the shadow-table column referencing the owning revision.
    #[must_use]
    pub fn revision_field_name(&self) -> &SqlIdentifier {
        &self.revision_field_name
    }

    /// Returns the shadow-table change-kind column.
    #[must_use]
    pub fn revision_type_field_name(&self) -> &SqlIdentifier {
        &self.revision_type_field_name
    }

    /// Returns audited types in registration order.
    #[must_use]
    pub fn audited_types(&self) -> &[AuditedTypeDescriptor] {
        self.audited_types.as_slice()
    }

    /// Returns true when the type is registered as audited.
    #[must_use]
    pub fn is_audited(&self, type_name: &str) -> bool {
        self.type_index.contains_key(type_name)
    }

    /// Returns the descriptor of a registered audited type.
    pub fn audited_type(&self, type_name: &str) -> AppResult<&AuditedTypeDescriptor> {
        self.type_index
            .get(type_name)
            .and_then(|index| self.audited_types.get(*index))
            .ok_or_else(|| AppError::NotFound(format!("type '{type_name}' is not audited")))
    }

    /// Returns the shadow table name of a registered audited type.
    pub fn table_name(&self, type_name: &str) -> AppResult<&str> {
        self.audited_type(type_name)
            .map(|descriptor| descriptor.table_name().as_str())
    }

    /// Returns the configured retention period in months. `None` keeps history forever.
    #[must_use]
    pub fn retention_period_months(&self) -> Option<u32> {
        let stored = self.retention_period_months.load(Ordering::Acquire);
        u32::try_from(stored).ok()
    }

    /// Sets the retention period. Negative or oversized values are rejected and
    /// leave the previous value in effect.
    pub fn set_retention_period_months(&self, value: Option<i64>) -> AppResult<()> {
        let stored = match value {
            Some(months) => i64::from(validate_retention_months(months)?),
            None => UNLIMITED_RETENTION,
        };

        self.retention_period_months.store(stored, Ordering::Release);
        Ok(())
    }

    /// Sets the retention period from text. Blank input clears it.
    pub fn set_retention_period_months_from_str(&self, raw: &str) -> AppResult<()> {
        let parsed = parse_retention_months(raw)?;
        self.set_retention_period_months(parsed.map(i64::from))
    }
}

#[derive(Debug, Clone)]
struct PendingAuditType {
    type_name: String,
    base_table: String,
    key_columns: Vec<String>,
}

/// Builder for [`AuditConfiguration`].
#[derive(Debug, Clone)]
pub struct AuditConfigurationBuilder {
    table_prefix: String,
    table_suffix: String,
    revision_table_name: String,
    revision_field_name: String,
    revision_type_field_name: String,
    retention_period_months: Option<i64>,
    audit_types: Vec<PendingAuditType>,
}

impl Default for AuditConfigurationBuilder {
    fn default() -> Self {
        Self {
            table_prefix: String::new(),
            table_suffix: "_audit".to_owned(),
            revision_table_name: "revisions".to_owned(),
            revision_field_name: "rev".to_owned(),
            revision_type_field_name: "revtype".to_owned(),
            retention_period_months: None,
            audit_types: Vec::new(),
        }
    }
}

impl AuditConfigurationBuilder {
    /// Sets the prefix prepended to audited table names.
    #[must_use]
    pub fn table_prefix(mut self, value: impl Into<String>) -> Self {
        self.table_prefix = value.into();
        self
    }

    /// Sets the suffix appended to audited table names.
    #[must_use]
    pub fn table_suffix(mut self, value: impl Into<String>) -> Self {
        self.table_suffix = value.into();
        self
    }

    /// Sets the revision table name.
    #[must_use]
    pub fn revision_table_name(mut self, value: impl Into<String>) -> Self {
        self.revision_table_name = value.into();
        self
    }

    /// Sets the column referencing the owning revision.
    #[must_use]
    pub fn revision_field_name(mut self, value: impl Into<String>) -> Self {
        self.revision_field_name = value.into();
        self
    }

    /// Sets the change-kind column.
    #[must_use]
    pub fn revision_type_field_name(mut self, value: impl Into<String>) -> Self {
        self.revision_type_field_name = value.into();
        self
    }

    /// Sets the initial retention period, validated on build.
    #[must_use]
    pub fn retention_period_months(mut self, value: Option<i64>) -> Self {
        self.retention_period_months = value;
        self
    }

    /// Registers an audited type backed by `base_table` with the given key columns.
    #[must_use]
    pub fn audit_type(
        mut self,
        type_name: impl Into<String>,
        base_table: impl Into<String>,
        key_columns: &[&str],
    ) -> Self {
        self.audit_types.push(PendingAuditType {
            type_name: type_name.into(),
            base_table: base_table.into(),
            key_columns: key_columns.iter().map(|column| (*column).to_owned()).collect(),
        });
        self
    }

    /// Validates every setting and freezes the audited type registry.
    pub fn build(self) -> AppResult<AuditConfiguration> {
        let revision_table_name = SqlIdentifier::new(self.revision_table_name)?;
        let revision_field_name = SqlIdentifier::new(self.revision_field_name)?;
        let revision_type_field_name = SqlIdentifier::new(self.revision_type_field_name)?;

        let retention = match self.retention_period_months {
            Some(months) => i64::from(validate_retention_months(months)?),
            None => UNLIMITED_RETENTION,
        };

        let mut audited_types = Vec::with_capacity(self.audit_types.len());
        let mut type_index = HashMap::new();
        let mut table_owners: HashMap<String, String> = HashMap::new();

        for pending in self.audit_types {
            if type_index.contains_key(pending.type_name.as_str()) {
                return Err(AppError::Configuration(format!(
                    "type '{}' is registered more than once",
                    pending.type_name
                )));
            }

            let table_name = SqlIdentifier::new(format!(
                "{}{}{}",
                self.table_prefix, pending.base_table, self.table_suffix
            ))?;

            if table_name == revision_table_name {
                return Err(AppError::Configuration(format!(
                    "shadow table of type '{}' collides with the revision table '{}'",
                    pending.type_name, revision_table_name
                )));
            }

            if let Some(owner) = table_owners.get(table_name.as_str()) {
                return Err(AppError::Configuration(format!(
                    "types '{owner}' and '{}' both resolve to shadow table '{table_name}'",
                    pending.type_name
                )));
            }

            let key_columns = pending
                .key_columns
                .into_iter()
                .map(SqlIdentifier::new)
                .collect::<AppResult<Vec<_>>>()?;

            let descriptor = AuditedTypeDescriptor::new(
                pending.type_name.clone(),
                table_name.clone(),
                key_columns,
                revision_field_name.clone(),
                revision_type_field_name.clone(),
            )?;

            table_owners.insert(table_name.as_str().to_owned(), pending.type_name.clone());
            type_index.insert(pending.type_name, audited_types.len());
            audited_types.push(descriptor);
        }

        Ok(AuditConfiguration {
            table_prefix: self.table_prefix,
            table_suffix: self.table_suffix,
            revision_table_name,
            revision_field_name,
            revision_type_field_name,
            audited_types,
            type_index,
            retention_period_months: AtomicI64::new(retention),
        })
    }
}

#[cfg(test)]
mod tests {
    use revtrail_core::AppError;

    use super::AuditConfiguration;

    fn relation_configuration() -> AuditConfiguration {
        AuditConfiguration::builder()
            .audit_type("category", "category", &["id"])
            .audit_type("food_category", "food_category", &["id"])
            .audit_type("product", "product", &["id"])
            .audit_type("cheese_product", "cheese_product", &["id"])
            .build()
            .unwrap_or_else(|error| panic!("test configuration: {error}"))
    }

    #[test]
    fn invalid_retention_periods_are_rejected_and_previous_value_kept() {
        let configuration = relation_configuration();
        assert!(configuration.set_retention_period_months(Some(4)).is_ok());

        let negative = configuration.set_retention_period_months(Some(-1));
        assert!(matches!(negative, Err(AppError::Configuration(_))));

        let non_numeric = configuration.set_retention_period_months_from_str("a");
        assert!(matches!(non_numeric, Err(AppError::Configuration(_))));

        let fractional = configuration.set_retention_period_months_from_str("2.5");
        assert!(matches!(fractional, Err(AppError::Configuration(_))));

        assert_eq!(configuration.retention_period_months(), Some(4));
    }

    #[test]
    fn valid_retention_periods_round_trip() {
        let configuration = relation_configuration();

        for period in [None, Some(0), Some(1), Some(1000)] {
            assert!(configuration.set_retention_period_months(period).is_ok());
            assert_eq!(
                configuration.retention_period_months().map(i64::from),
                period,
                "mismatch when retrieving retention period"
            );
        }
    }

    #[test]
    fn blank_text_clears_retention() {
        let configuration = relation_configuration();
        assert!(configuration.set_retention_period_months(Some(6)).is_ok());
        assert!(configuration.set_retention_period_months_from_str("  ").is_ok());
        assert_eq!(configuration.retention_period_months(), None);
    }

    #[test]
    fn table_names_follow_prefix_and_suffix() {
        let configuration = AuditConfiguration::builder()
            .table_prefix("hist_")
            .table_suffix("_log")
            .audit_type("product", "product", &["id"])
            .build()
            .unwrap_or_else(|error| panic!("test configuration: {error}"));

        assert_eq!(
            configuration.table_name("product").ok(),
            Some("hist_product_log")
        );
        assert!(matches!(
            configuration.table_name("invoice"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn audited_types_keep_registration_order() {
        let configuration = relation_configuration();
        let names: Vec<&str> = configuration
            .audited_types()
            .iter()
            .map(|descriptor| descriptor.type_name())
            .collect();

        assert_eq!(
            names,
            vec!["category", "food_category", "product", "cheese_product"]
        );
        assert!(configuration.is_audited("product"));
        assert!(!configuration.is_audited("invoice"));
    }

    #[test]
    fn colliding_shadow_tables_are_rejected() {
        let duplicate_table = AuditConfiguration::builder()
            .audit_type("product", "product", &["id"])
            .audit_type("legacy_product", "product", &["id"])
            .build();
        assert!(matches!(duplicate_table, Err(AppError::Configuration(_))));

        let duplicate_type = AuditConfiguration::builder()
            .audit_type("product", "product", &["id"])
            .audit_type("product", "goods", &["id"])
            .build();
        assert!(matches!(duplicate_type, Err(AppError::Configuration(_))));

        let revision_clash = AuditConfiguration::builder()
            .table_suffix("")
            .audit_type("revision", "revisions", &["id"])
            .build();
        assert!(matches!(revision_clash, Err(AppError::Configuration(_))));
    }

    #[test]
    fn invalid_identifiers_are_rejected() {
        let configuration = AuditConfiguration::builder()
            .revision_table_name("revisions; --")
            .build();
        assert!(matches!(configuration, Err(AppError::Configuration(_))));

        let negative_retention = AuditConfiguration::builder()
            .retention_period_months(Some(-3))
            .build();
        assert!(matches!(negative_retention, Err(AppError::Configuration(_))));
    }
}
