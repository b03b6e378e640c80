use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Format a timestamp for storage. Fixed-width fractional seconds keep the
/// lexicographic order of the column identical to chronological order, which
/// the `created_at <` pagination cursor relies on.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp, returning CorruptRow on failure.
pub fn parse_ts(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            table,
            column,
            detail: format!("invalid timestamp: {e}"),
        })
}

/// Parse a JSON string-array column (e.g. selected_types).
pub fn parse_tags(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid JSON: {e}"),
    })
}

/// Parse a string into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use leadbox_core::InquiryStatus;

    #[test]
    fn ts_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 45).unwrap();
        let raw = fmt_ts(ts);
        assert_eq!(parse_ts(&raw, "inquiries", "created_at").unwrap(), ts);
    }

    #[test]
    fn ts_order_matches_string_order() {
        let a = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let c = a + chrono::Duration::seconds(1);
        assert!(fmt_ts(a) < fmt_ts(b));
        assert!(fmt_ts(b) < fmt_ts(c));
    }

    #[test]
    fn parse_ts_failure() {
        let result = parse_ts("yesterday", "inquiries", "created_at");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "inquiries", column: "created_at", .. })
        ));
    }

    #[test]
    fn parse_tags_success() {
        let tags = parse_tags(r#"["wedding","portrait"]"#, "inquiries", "selected_types").unwrap();
        assert_eq!(tags, vec!["wedding".to_string(), "portrait".to_string()]);
    }

    #[test]
    fn parse_tags_failure() {
        let result = parse_tags("not json", "inquiries", "selected_types");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "inquiries", column: "selected_types", .. })
        ));
    }

    #[test]
    fn parse_enum_success() {
        let status: InquiryStatus = parse_enum("contacted", "inquiries", "status").unwrap();
        assert_eq!(status, InquiryStatus::Contacted);
    }

    #[test]
    fn parse_enum_failure() {
        let result: Result<InquiryStatus, _> = parse_enum("INVALID", "inquiries", "status");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "inquiries", column: "status", .. })
        ));
    }
}
