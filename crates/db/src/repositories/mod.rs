use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use sitescope_core::errors::StoreError;

pub mod approval;
pub mod catalog;

pub use approval::SqlApprovalStore;
pub use catalog::SqlCatalogRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(sqlx::Error::Database(database_error))
                if database_error.is_unique_violation() =>
            {
                StoreError::Conflict(database_error.message().to_owned())
            }
            RepositoryError::Database(error) => StoreError::Database(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Decode(message),
        }
    }
}

/// Microsecond RFC 3339 in UTC; the fixed width keeps text ordering chronological.
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    value.parse::<Decimal>().map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_json<T>(column: &str, value: &str) -> Result<T, RepositoryError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_str(value).map_err(|error| {
        RepositoryError::Decode(format!("invalid JSON in `{column}`: {error}"))
    })
}

pub(crate) fn to_json<T>(column: &str, value: &T) -> Result<String, RepositoryError>
where
    T: serde::Serialize,
{
    serde_json::to_string(value).map_err(|error| {
        RepositoryError::Decode(format!("could not encode `{column}` as JSON: {error}"))
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{format_timestamp, parse_decimal, parse_timestamp, parse_u32, RepositoryError};
    use sitescope_core::errors::StoreError;

    #[test]
    fn timestamps_keep_microseconds_and_sort_as_text() {
        let earlier = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid date");
        let later = earlier + chrono::Duration::microseconds(1);

        let (earlier_text, later_text) = (format_timestamp(&earlier), format_timestamp(&later));

        assert_eq!(earlier_text, "2026-03-01T09:00:00.000000Z");
        assert!(earlier_text < later_text);
        assert_eq!(parse_timestamp("at", later_text).expect("parse"), later);
    }

    #[test]
    fn malformed_columns_are_decode_errors() {
        assert!(matches!(parse_u32("version", -1), Err(RepositoryError::Decode(_))));
        assert!(matches!(parse_decimal("unit_cost", "12.x"), Err(RepositoryError::Decode(_))));

        let store_error: StoreError = RepositoryError::Decode("bad".to_owned()).into();
        assert_eq!(store_error, StoreError::Decode("bad".to_owned()));
    }
}
