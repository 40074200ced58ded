//! Database query modules for CRUD operations.
//!
//! Each module provides async functions that operate on the database.
//! Timestamps are stored as fixed-width RFC 3339 text so that they sort
//! lexically in time order.

pub mod categories;
pub mod messages;
pub mod owners;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;

pub(crate) fn to_sql_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_sql_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
