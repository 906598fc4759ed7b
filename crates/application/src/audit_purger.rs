use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{Instrument, debug, error, info, info_span, warn};

use revtrail_core::{AppError, AppResult};
use revtrail_domain::purge_cutoff;

use crate::audit_configuration::AuditConfiguration;
use crate::audit_ports::AuditStore;


/// Stages of one purge invocation, reported on log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgePhase {
    /// Choosing between the override and the configured retention.
    ResolvingRetention,
    /// No retention applies; nothing is deleted.
    Disabled,
    /// Deriving the cutoff instant.
    ComputingCutoff,
    /// Deleting shadow rows, one audited type at a time.
    DeletingAuditRecords,
    /// Deleting revisions once no shadow row references them.
    DeletingRevisions,
    /// Checking for orphaned shadow rows before commit.
    VerifyingIntegrity,
    /// Committing the transaction.
    Committing,
    /// Transaction committed.
    Committed,
    /// Transaction abandoned; stored state is unchanged.
    RolledBack,
}

impl PurgePhase {
    /// Returns a stable label for the phase.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResolvingRetention => "resolving_retention",
            Self::Disabled => "disabled",
            Self::ComputingCutoff => "computing_cutoff",
            Self::DeletingAuditRecords => "deleting_audit_records",
            Self::DeletingRevisions => "deleting_revisions",
            Self::VerifyingIntegrity => "verifying_integrity",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

/// Rows removed from one shadow table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgedTableCount {
    /// Audited type identifier.
    pub type_name: String,
    /// Shadow table name.
    pub table_name: String,
    /// Number of deleted shadow rows.
    pub deleted_count: u64,
}

/// Outcome of a committed or disabled purge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    /// Effective retention window in months, absent when purge was disabled.
    pub retention_months: Option<u32>,
    /// Cutoff instant; revisions strictly older were removed.
    pub purge_date: Option<DateTime<Utc>>,
    /// Shadow rows removed per audited type, in registration order.
    pub audit_records: Vec<PurgedTableCount>,
    /// Number of deleted revisions.
    pub deleted_revisions: u64,
}

impl PurgeReport {
    fn disabled() -> Self {
        Self {
            retention_months: None,
            purge_date: None,
            audit_records: Vec::new(),
            deleted_revisions: 0,
        }
    }

    /// Returns true when no retention applied and nothing was attempted.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.purge_date.is_none()
    }

    /// Returns the number of deleted shadow rows across all audited types.
    #[must_use]
    pub fn deleted_audit_records(&self) -> u64 {
        self.audit_records
            .iter()
            .map(|table| table.deleted_count)
            .sum()
    }

    /// Returns every deleted row, shadow rows and revisions together.
    #[must_use]
    pub fn total_deleted(&self) -> u64 {
        self.deleted_audit_records() + self.deleted_revisions
    }
}

/// Orphaned shadow rows found in one audited table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanCount {
    /// Audited type identifier.
    pub type_name: String,
    /// Number of shadow rows without a revision.
    pub orphan_count: u64,
}

/// Deletes revisions and their audit records older than the retention window.
///
/// Shadow rows of every audited type are removed before the revisions they
/// reference, inside one transaction, so an interrupted purge can leave extra
/// revisions behind but never an orphaned shadow row.
pub struct AuditPurger {
    store: Arc<dyn AuditStore>,
    configuration: Arc<AuditConfiguration>,
}

impl AuditPurger {
    /// Creates a purger bound to a persistence context and a shared configuration.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>, configuration: Arc<AuditConfiguration>) -> Self {
        Self {
            store,
            configuration,
        }
    }

    /// Returns the override when present, else the configured retention.
    #[must_use]
    pub fn effective_retention(&self, override_months: Option<u32>) -> Option<u32> {
        override_months.or_else(|| self.configuration.retention_period_months())
    }

    /// Returns the cutoff for a purge run now, or `None` when purging is disabled.
    #[must_use]
    pub fn purge_date(&self, override_months: Option<u32>) -> Option<DateTime<Utc>> {
        self.purge_date_at(override_months, Utc::now())
    }

    /// Returns the cutoff for a purge run at `now`.
    #[must_use]
    pub fn purge_date_at(
        &self,
        override_months: Option<u32>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.effective_retention(override_months)
            .map(|months| purge_cutoff(now, months))
    }

    /// Runs a retention purge using the current time.
    pub async fn purge(&self, override_months: Option<u32>) -> AppResult<PurgeReport> {
        self.purge_at(override_months, Utc::now()).await
    }

    /// Runs a retention purge as if invoked at `now`.
    ///
    /// Either every eligible row is deleted or nothing is. A disabled purge
    /// returns an empty report rather than an error.
    pub async fn purge_at(
        &self,
        override_months: Option<u32>,
        now: DateTime<Utc>,
    ) -> AppResult<PurgeReport> {
        debug!(
            phase = PurgePhase::ResolvingRetention.as_str(),
            override_months = ?override_months,
            configured_months = ?self.configuration.retention_period_months(),
            "resolving audit retention"
        );
        let Some(retention_months) = self.effective_retention(override_months) else {
            info!(
                phase = PurgePhase::Disabled.as_str(),
                "audit purge skipped: no retention period configured"
            );
            return Ok(PurgeReport::disabled());
        };

        let cutoff = purge_cutoff(now, retention_months);
        let span = info_span!("audit_purge", retention_months, purge_date = %cutoff);
        info!(
            parent: &span,
            phase = PurgePhase::ComputingCutoff.as_str(),
            overridden = override_months.is_some(),
            "audit purge started"
        );

        self.execute(retention_months, cutoff).instrument(span).await
    }

    async fn execute(
        &self,
        retention_months: u32,
        cutoff: DateTime<Utc>,
    ) -> AppResult<PurgeReport> {
        let revision_table = self.configuration.revision_table_name();

        let mut transaction = self
            .store
            .begin_purge()
            .await
            .map_err(|error| abort(PurgePhase::ComputingCutoff, error))?;

        let mut audit_records = Vec::with_capacity(self.configuration.audited_types().len());
        for descriptor in self.configuration.audited_types() {
            let deleted_count = transaction
                .delete_audit_records_before(descriptor, revision_table, cutoff)
                .await
                .map_err(|error| abort(PurgePhase::DeletingAuditRecords, error))?;

            info!(
                phase = PurgePhase::DeletingAuditRecords.as_str(),
                audited_type = descriptor.type_name(),
                table = %descriptor.table_name(),
                deleted_count,
                "purged audit records"
            );

            audit_records.push(PurgedTableCount {
                type_name: descriptor.type_name().to_owned(),
                table_name: descriptor.table_name().as_str().to_owned(),
                deleted_count,
            });
        }

        let deleted_revisions = transaction
            .delete_revisions_before(revision_table, cutoff)
            .await
            .map_err(|error| abort(PurgePhase::DeletingRevisions, error))?;

        for descriptor in self.configuration.audited_types() {
            let orphans = transaction
                .count_orphaned_audit_records(descriptor, revision_table)
                .await
                .map_err(|error| abort(PurgePhase::VerifyingIntegrity, error))?;

            if orphans > 0 {
                error!(
                    phase = PurgePhase::VerifyingIntegrity.as_str(),
                    audited_type = descriptor.type_name(),
                    table = %descriptor.table_name(),
                    orphans,
                    "orphaned audit records detected, rolling back purge"
                );
                return Err(abort(
                    PurgePhase::VerifyingIntegrity,
                    AppError::Integrity(format!(
                        "{orphans} audit record(s) in '{}' reference missing {} rows",
                        descriptor.table_name(),
                        revision_table
                    )),
                ));
            }
        }

        transaction
            .commit()
            .await
            .map_err(|error| abort(PurgePhase::Committing, error))?;

        let report = PurgeReport {
            retention_months: Some(retention_months),
            purge_date: Some(cutoff),
            audit_records,
            deleted_revisions,
        };

        info!(
            phase = PurgePhase::Committed.as_str(),
            retention_months,
            purge_date = %cutoff,
            deleted_revisions,
            deleted_audit_records = report.deleted_audit_records(),
            "audit purge committed"
        );

        Ok(report)
    }

    /// Counts orphaned shadow rows per audited type using committed state.
    pub async fn count_orphans(&self) -> AppResult<Vec<OrphanCount>> {
        let revision_table = self.configuration.revision_table_name();
        let mut counts = Vec::with_capacity(self.configuration.audited_types().len());

        for descriptor in self.configuration.audited_types() {
            let orphan_count = self
                .store
                .count_orphaned_audit_records(descriptor, revision_table)
                .await?;
            counts.push(OrphanCount {
                type_name: descriptor.type_name().to_owned(),
                orphan_count,
            });
        }

        Ok(counts)
    }
}

/// Logs the rollback and maps the failure to a purge error.
///
/// The transaction itself is released by its drop guard when the caller returns.
fn abort(phase: PurgePhase, error: AppError) -> AppError {
    warn!(
        phase = PurgePhase::RolledBack.as_str(),
        failed_phase = phase.as_str(),
        error = %error,
        "audit purge rolled back"
    );

    match error {
        AppError::Integrity(_) | AppError::PurgeFailure(_) => error,
        other => AppError::PurgeFailure(format!("{}: {other}", phase.as_str())),
    }
}
