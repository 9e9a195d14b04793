//! Version log bookkeeping shared by the dialects.
//!
//! The version log is a catalog table with one row per applied migration:
//! `version`, `migration_name`, `start_time`, `end_time`. Each dialect owns
//! the DDL and the statements; this module holds the entry type, name
//! truncation, and decoding of catalog rows into entries.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use phinx_rs_core::{PhinxError, PhinxResult};
use phinx_rs_db::{Row, Value};

/// Maximum number of characters stored for a migration name.
pub const MIGRATION_NAME_LIMIT: usize = 100;

/// Timestamp layout used by engines that store version log times as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionLogEntry {
    /// Migration version.
    pub version: i64,
    /// Migration name, truncated to [`MIGRATION_NAME_LIMIT`] characters.
    pub migration_name: Option<String>,
    /// When the migration started.
    pub start_time: Option<DateTime<Utc>>,
    /// When the migration finished.
    pub end_time: Option<DateTime<Utc>>,
}

/// Truncates a migration name to [`MIGRATION_NAME_LIMIT`] characters.
///
/// Truncation happens on a character boundary and is logged at `warn`.
pub fn truncate_name(name: &str) -> &str {
    match name.char_indices().nth(MIGRATION_NAME_LIMIT) {
        Some((idx, _)) => {
            tracing::warn!(
                name,
                limit = MIGRATION_NAME_LIMIT,
                "Migration name truncated in version log"
            );
            &name[..idx]
        }
        None => name,
    }
}

/// Formats a timestamp for text storage.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Decodes a stored timestamp.
///
/// Accepts native timestamps as well as text in [`TIMESTAMP_FORMAT`] or
/// RFC 3339. NULL decodes to `None`.
pub fn parse_timestamp(value: &Value) -> PhinxResult<Option<DateTime<Utc>>> {
    match value {
        Value::Null => Ok(None),
        Value::DateTimeTz(dt) => Ok(Some(*dt)),
        Value::DateTime(dt) => Ok(Some(dt.and_utc())),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
                return Ok(Some(dt.and_utc()));
            }
            DateTime::parse_from_rfc3339(s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(|e| PhinxError::DataError(format!("Invalid timestamp '{s}': {e}")))
        }
        other => Err(PhinxError::DataError(format!(
            "Expected timestamp, got {other:?}"
        ))),
    }
}

/// Builds the ordered version log from catalog rows.
///
/// Field names are matched case-insensitively so engines that report
/// upper-case column names decode the same way.
pub fn entries_from_rows(rows: &[Row]) -> PhinxResult<BTreeMap<i64, VersionLogEntry>> {
    let mut log = BTreeMap::new();
    for row in rows {
        let row = row.normalized();
        let version: i64 = row.get("version")?;
        let migration_name: Option<String> = row.get("migration_name")?;
        let start_time = row
            .get_value("start_time")
            .map_or(Ok(None), parse_timestamp)?;
        let end_time = row
            .get_value("end_time")
            .map_or(Ok(None), parse_timestamp)?;
        log.insert(
            version,
            VersionLogEntry {
                version,
                migration_name,
                start_time,
                end_time,
            },
        );
    }
    Ok(log)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn row(version: Value, name: Value, start: Value, end: Value) -> Row {
        Row::new(
            vec![
                "VERSION".into(),
                "MIGRATION_NAME".into(),
                "START_TIME".into(),
                "END_TIME".into(),
            ],
            vec![version, name, start, end],
        )
    }

    #[test]
    fn test_truncate_name_short() {
        assert_eq!(truncate_name("CreateUsers"), "CreateUsers");
        let exact = "a".repeat(MIGRATION_NAME_LIMIT);
        assert_eq!(truncate_name(&exact), exact);
    }

    #[test]
    fn test_truncate_name_long() {
        let long = "x".repeat(150);
        assert_eq!(truncate_name(&long).chars().count(), MIGRATION_NAME_LIMIT);
    }

    #[test]
    fn test_truncate_name_multibyte_boundary() {
        let long = "é".repeat(120);
        let truncated = truncate_name(&long);
        assert_eq!(truncated.chars().count(), MIGRATION_NAME_LIMIT);
        assert!(truncated.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_format_and_parse_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let text = format_timestamp(&ts);
        assert_eq!(text, "2024-03-09 14:05:07");
        assert_eq!(parse_timestamp(&Value::String(text)).unwrap(), Some(ts));
        assert_eq!(
            parse_timestamp(&Value::from("2024-03-09T14:05:07+00:00")).unwrap(),
            Some(ts)
        );
        assert_eq!(parse_timestamp(&Value::DateTimeTz(ts)).unwrap(), Some(ts));
        assert_eq!(parse_timestamp(&Value::Null).unwrap(), None);
        assert!(parse_timestamp(&Value::from("yesterday")).is_err());
        assert!(parse_timestamp(&Value::Int(5)).is_err());
    }

    #[test]
    fn test_entries_from_rows_ordered_and_normalized() {
        let rows = vec![
            row(
                Value::Int(3),
                Value::from("Third"),
                Value::from("2024-01-03 00:00:00"),
                Value::from("2024-01-03 00:00:01"),
            ),
            row(Value::from("1"), Value::Null, Value::Null, Value::Null),
            row(
                Value::Int(2),
                Value::from("Second"),
                Value::Null,
                Value::Null,
            ),
        ];

        let log = entries_from_rows(&rows).unwrap();
        assert_eq!(log.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(log[&3].migration_name.as_deref(), Some("Third"));
        assert!(log[&1].migration_name.is_none());
        assert_eq!(
            log[&3].end_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 1).unwrap())
        );
    }

    #[test]
    fn test_entries_from_rows_bad_version() {
        let rows = vec![row(Value::from("abc"), Value::Null, Value::Null, Value::Null)];
        assert!(entries_from_rows(&rows).is_err());
    }
}
