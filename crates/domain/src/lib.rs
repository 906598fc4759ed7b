//! Domain entities and invariants for the revision audit trail.

#![forbid(unsafe_code)]

mod audit_record;
mod audited_type;
mod retention;
mod revision;

pub use audit_record::{AuditRecord, EntityKey, RevisionType};
pub use audited_type::AuditedTypeDescriptor;
pub use retention::{
    earliest_purge_cutoff, parse_retention_months, period_start, purge_cutoff,
    validate_retention_months,
};
pub use revision::{Revision, RevisionId};
