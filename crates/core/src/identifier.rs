use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

/// PostgreSQL truncates identifiers longer than this many bytes.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// A table or column name that is safe to splice into SQL text.
///
/// Accepts `[A-Za-z_][A-Za-z0-9_]*`. Adapters still quote the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SqlIdentifier(String);

impl SqlIdentifier {
    /// Validates and wraps an identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let mut characters = value.chars();

        let starts_well = characters
            .next()
            .map(|first| first.is_ascii_alphabetic() || first == '_')
            .unwrap_or(false);
        let rest_is_valid = characters.all(|character| {
            character.is_ascii_alphanumeric() || character == '_'
        });

        if !starts_well || !rest_is_valid {
            return Err(AppError::Configuration(format!(
                "'{value}' is not a valid SQL identifier"
            )));
        }

        if value.len() > MAX_IDENTIFIER_LENGTH {
            return Err(AppError::Configuration(format!(
                "SQL identifier '{value}' exceeds {MAX_IDENTIFIER_LENGTH} bytes"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the identifier wrapped in double quotes.
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl Display for SqlIdentifier {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

impl TryFrom<String> for SqlIdentifier {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SqlIdentifier> for String {
    fn from(value: SqlIdentifier) -> Self {
        value.0
    }
}
