use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};
use revtrail_core::{AppError, AppResult};

/// Validates a retention period expressed in whole months.
///
/// Zero is valid and keeps nothing older than the start of the current month.
pub fn validate_retention_months(value: i64) -> AppResult<u32> {
    if value < 0 {
        return Err(AppError::Configuration(format!(
            "retention period must be a non-negative number of months, got {value}"
        )));
    }

    u32::try_from(value).map_err(|_| {
        AppError::Configuration(format!(
            "retention period of {value} months exceeds the supported maximum of {}",
            u32::MAX
        ))
    })
}

/// Parses a textual retention period. Blank input means unlimited retention.
pub fn parse_retention_months(raw: &str) -> AppResult<Option<u32>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value = trimmed.parse::<i64>().map_err(|_| {
        AppError::Configuration(format!(
            "retention period must be an integer number of months, got '{trimmed}'"
        ))
    })?;

    validate_retention_months(value).map(Some)
}

/// Returns the first instant of the month containing `now`.
#[must_use]
pub fn period_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.date_naive();
    date.with_day(1)
        .unwrap_or(date)
        .and_time(NaiveTime::MIN)
        .and_utc()
}

/// Returns the earliest cutoff ever handed to a store: 0001-01-01T00:00:00Z.
///
/// PostgreSQL rejects `timestamptz` values before 4713 BC, so cutoffs are
/// clamped to a date every backend can bind.
#[must_use]
pub fn earliest_purge_cutoff() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Returns the purge cutoff: the start of the current month minus `months`.
///
/// Cutoffs earlier than [`earliest_purge_cutoff`] are clamped to it.
#[must_use]
pub fn purge_cutoff(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    let floor = earliest_purge_cutoff();
    period_start(now)
        .checked_sub_months(Months::new(months))
        .map_or(floor, |cutoff| cutoff.max(floor))
}
