//! Date/time utilities for ephemail.
//!
//! Timestamps are persisted as INTEGER microseconds since the Unix epoch.
//! Values are truncated to microsecond precision before any arithmetic so
//! that what is stored and what is compared are always the same instant.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Current time, truncated to storage precision.
pub fn now() -> DateTime<Utc> {
    truncate(Utc::now())
}

/// Truncate a datetime to microsecond precision.
pub fn truncate(dt: DateTime<Utc>) -> DateTime<Utc> {
    from_micros(to_micros(dt)).unwrap_or(dt)
}

/// Convert a datetime to its stored representation.
pub fn to_micros(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_micros()
}

/// Convert a stored value back to a datetime.
pub fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}

/// Read a timestamp column from a row.
pub(crate) fn get_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    let micros: i64 = row.try_get(column)?;
    from_micros(micros).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("timestamp {micros} out of range").into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_micros_roundtrip_is_exact() {
        let dt = Utc.with_ymd_and_hms(2026, 10, 19, 12, 30, 0).unwrap()
            + chrono::Duration::microseconds(123_456);
        assert_eq!(from_micros(to_micros(dt)), Some(dt));
    }

    #[test]
    fn test_truncate_drops_nanoseconds() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(1_500);
        let truncated = truncate(dt);
        assert_eq!(truncated.timestamp_subsec_nanos(), 1_000);
        assert_eq!(truncate(truncated), truncated);
    }

    #[test]
    fn test_now_is_already_truncated() {
        let n = now();
        assert_eq!(n.timestamp_subsec_nanos() % 1_000, 0);
    }
}
