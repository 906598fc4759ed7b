//! Shared primitives for all Rust crates in Revtrail.

#![forbid(unsafe_code)]

/// SQL identifier validation shared by configuration and adapters.
pub mod identifier;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use identifier::SqlIdentifier;

/// Result type used across Revtrail crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Rejected audit configuration value. The previous value stays in effect.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Retention purge could not complete. Nothing was committed.
    #[error("purge failed: {0}")]
    PurgeFailure(String),

    /// An audit record references a revision that no longer exists.
    ///
    /// This is a programming error in the purge ordering and must not be retried.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true when the error signals a broken invariant rather than a runtime failure.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}
