//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_audit_store;
mod postgres_audit_store;

pub use in_memory_audit_store::InMemoryAuditStore;
pub use postgres_audit_store::PostgresAuditStore;
