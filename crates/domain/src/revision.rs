use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use revtrail_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Identifier of a revision, assigned by the persistence layer and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RevisionId(i64);

impl RevisionId {
    /// Creates a revision identifier. Identifiers start at 1.
    pub fn new(value: i64) -> AppResult<Self> {
        if value < 1 {
            return Err(AppError::Validation(format!(
                "revision id must be positive, got {value}"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for RevisionId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for RevisionId {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parsed = value.trim().parse::<i64>().map_err(|error| {
            AppError::Validation(format!("invalid revision id '{value}': {error}"))
        })?;
        Self::new(parsed)
    }
}

/// An immutable point in time at which one or more audited entities changed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    id: RevisionId,
    timestamp: DateTime<Utc>,
    actor: Option<NonEmptyString>,
}

impl Revision {
    /// Creates a revision with a validated optional actor.
    pub fn new(
        id: RevisionId,
        timestamp: DateTime<Utc>,
        actor: Option<String>,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            timestamp,
            actor: actor.map(NonEmptyString::new).transpose()?,
        })
    }

    /// Returns the revision identifier.
    #[must_use]
    pub fn id(&self) -> RevisionId {
        self.id
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the identity that produced the revision, when recorded.
    #[must_use]
    pub fn actor(&self) -> Option<&str> {
        self.actor.as_ref().map(NonEmptyString::as_str)
    }

    /// Returns true when the revision falls inside the purge window ending at `cutoff`.
    #[must_use]
    pub fn is_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.timestamp < cutoff
    }
}
