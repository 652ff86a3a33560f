use std::fmt::Display;
use std::str::FromStr;

use mtd_core::RepositoryError;
use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

/// A TEXT column parsed with [`FromStr`], e.g. a tax year or status.
pub fn get_parsed<T>(row: &SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: FromStr,
    T::Err: Display,
{
    let text: String = row
        .try_get(column)
        .map_err(|e| RepositoryError::Database(format!("Column '{}' not found: {}", column, e)))?;
    text.parse().map_err(|e| {
        RepositoryError::Database(format!("Invalid value '{}' in '{}': {}", text, column, e))
    })
}

/// A nullable TEXT column holding JSON.
pub fn get_optional_json(row: &SqliteRow, column: &str) -> Result<Option<Value>, RepositoryError> {
    let text: Option<String> = row
        .try_get(column)
        .map_err(|e| RepositoryError::Database(format!("Column '{}' not found: {}", column, e)))?;
    text.map(|t| {
        serde_json::from_str(&t).map_err(|e| {
            RepositoryError::Database(format!("Invalid JSON in '{}': {}", column, e))
        })
    })
    .transpose()
}

/// JSON text for binding, `None` stays NULL.
pub fn json_text(value: Option<&Value>) -> Result<Option<String>, RepositoryError> {
    value
        .map(|v| serde_json::to_string(v).map_err(|e| RepositoryError::Database(e.to_string())))
        .transpose()
}
