mod history;
mod store;

pub use history::{NewAuditRecord, NewRevision, RevisionHistoryQuery};
pub use store::{AuditStore, PurgeTransaction};
