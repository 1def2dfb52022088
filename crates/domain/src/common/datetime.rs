//! DateTime utilities with consistent error handling.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Parses an RFC3339 timestamp string, returning an error if parsing fails.
///
/// # Examples
///
/// ```
/// use labquest_domain::common::parse_datetime;
/// use chrono::Datelike;
///
/// let dt = parse_datetime("2024-01-15T10:30:00Z").unwrap();
/// assert_eq!(dt.year(), 2024);
/// ```
///
/// # Errors
///
/// Returns `chrono::ParseError` if the string is not valid RFC3339.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Formats a timestamp the way the store persists it (RFC3339, UTC).
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Whole days a completion is late, rounded up.
///
/// Any positive elapsed time past the due instant counts as a full day.
/// Completions at or before the due instant are zero days late.
///
/// # Examples
///
/// ```
/// use labquest_domain::common::ceil_days_late;
/// use chrono::{Duration, TimeZone, Utc};
///
/// let due = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
/// assert_eq!(ceil_days_late(due, due), 0);
/// assert_eq!(ceil_days_late(due, due + Duration::hours(1)), 1);
/// assert_eq!(ceil_days_late(due, due + Duration::days(2)), 2);
/// ```
pub fn ceil_days_late(due: DateTime<Utc>, completed: DateTime<Utc>) -> i64 {
    let elapsed_secs = (completed - due).num_seconds();
    if elapsed_secs <= 0 {
        return 0;
    }
    const SECS_PER_DAY: i64 = 86_400;
    (elapsed_secs + SECS_PER_DAY - 1) / SECS_PER_DAY
}

/// ISO (year, week) bucket for a calendar date.
pub fn iso_week_key(date: NaiveDate) -> (i32, u32) {
    let week = date.iso_week();
    (week.year(), week.week())
}
