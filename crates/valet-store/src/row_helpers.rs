use chrono::{DateTime, Utc};

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

/// Deserialize a JSON text column, returning CorruptRow on parse failure.
pub fn parse_json<T: serde::de::DeserializeOwned>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid JSON: {e}"),
    })
}

/// Parse a string column into an enum, returning CorruptRow on failure.
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

/// Parse an RFC 3339 timestamp column.
pub fn parse_timestamp(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            table,
            column,
            detail: format!("bad timestamp: {e}"),
        })
}
