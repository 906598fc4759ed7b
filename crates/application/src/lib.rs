//! Application services and ports for the revision audit trail.

#![forbid(unsafe_code)]

mod audit_configuration;
mod audit_manager;
mod audit_ports;
mod audit_purger;
mod audit_reader;
mod audit_writer;
mod entity_cache;

pub use audit_configuration::{AuditConfiguration, AuditConfigurationBuilder};
pub use audit_manager::AuditManager;
pub use audit_ports::{
    AuditStore, NewAuditRecord, NewRevision, PurgeTransaction, RevisionHistoryQuery,
};
pub use audit_purger::{AuditPurger, OrphanCount, PurgePhase, PurgeReport, PurgedTableCount};
pub use audit_reader::{AuditReader, ChangedEntity};
pub use audit_writer::{AuditWriter, EntityChange};
pub use entity_cache::EntityCache;
