use std::sync::Arc;

use crate::audit_configuration::AuditConfiguration;
use crate::audit_ports::AuditStore;
use crate::audit_purger::AuditPurger;
use crate::audit_reader::AuditReader;
use crate::audit_writer::AuditWriter;

/// Owns the audit configuration and hands out services bound to a store.
#[derive(Debug, Clone)]
pub struct AuditManager {
    configuration: Arc<AuditConfiguration>,
}

impl AuditManager {
    /// Creates a manager owning the given configuration.
    #[must_use]
    pub fn new(configuration: AuditConfiguration) -> Self {
        Self {
            configuration: Arc::new(configuration),
        }
    }

    /// Returns the shared configuration. Every call yields the same instance.
    #[must_use]
    pub fn configuration(&self) -> Arc<AuditConfiguration> {
        Arc::clone(&self.configuration)
    }

    /// Creates a reader with its own entity cache.
    #[must_use]
    pub fn create_audit_reader(&self, store: Arc<dyn AuditStore>) -> AuditReader {
        AuditReader::new(store, self.configuration())
    }

    /// Creates a retention purger.
    #[must_use]
    pub fn create_audit_purger(&self, store: Arc<dyn AuditStore>) -> AuditPurger {
        AuditPurger::new(store, self.configuration())
    }

    /// Creates a revision writer.
    #[must_use]
    pub fn create_audit_writer(&self, store: Arc<dyn AuditStore>) -> AuditWriter {
        AuditWriter::new(store, self.configuration())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::AuditManager;
    use crate::AuditConfiguration;

    #[test]
    fn configuration_is_shared_across_calls() {
        let manager = AuditManager::new(
            AuditConfiguration::builder()
                .build()
                .unwrap_or_else(|error| panic!("test configuration: {error}")),
        );

        let first = manager.configuration();
        let second = manager.configuration();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(first.set_retention_period_months(Some(12)).is_ok());
        assert_eq!(second.retention_period_months(), Some(12));
    }
}
