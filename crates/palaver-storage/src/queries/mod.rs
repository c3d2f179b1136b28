// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed CRUD operations, one module per entity family.

pub mod connections;
pub mod contacts;
pub mod conversations;
pub mod flows;
pub mod interactions;
pub mod messages;
pub mod schedules;

use std::str::FromStr;

/// Parse a stored enum column, surfacing bad values as a column conversion
/// error instead of a panic.
pub(crate) fn parse_enum<T: FromStr>(value: String, idx: usize) -> rusqlite::Result<T> {
    value.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid enum value: {value}").into(),
        )
    })
}

/// Serialize a JSON column value for storage.
pub(crate) fn to_json_column<T: serde::Serialize>(value: &T) -> rusqlite::Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Parse a JSON column back into its typed form.
pub(crate) fn from_json_column<T: serde::de::DeserializeOwned>(
    value: String,
    idx: usize,
) -> rusqlite::Result<T> {
    serde_json::from_str(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
