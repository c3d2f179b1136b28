// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection CRUD operations.

use palaver_core::PalaverError;
use palaver_core::types::ConnectionStatus;
use rusqlite::params;

use crate::database::Database;
use crate::models::Connection;

/// Insert a new connection.
pub async fn insert_connection(db: &Database, connection: &Connection) -> Result<(), PalaverError> {
    let connection = connection.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO connections
                     (id, tenant_id, name, kind, status, pairing_code, retry_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    connection.id,
                    connection.tenant_id,
                    connection.name,
                    connection.kind.to_string(),
                    connection.status.to_string(),
                    connection.pairing_code,
                    connection.retry_count,
                    connection.created_at,
                    connection.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a connection by id.
pub async fn get_connection(db: &Database, id: &str) -> Result<Option<Connection>, PalaverError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, tenant_id, name, kind, status, pairing_code, retry_count, created_at, updated_at
                 FROM connections WHERE id = ?1",
            )?;
            let result = stmt.query_row(params![id], |row| {
                Ok(Connection {
                    id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    name: row.get(2)?,
                    kind: super::parse_enum(row.get::<_, String>(3)?, 3)?,
                    status: super::parse_enum(row.get::<_, String>(4)?, 4)?,
                    pairing_code: row.get(5)?,
                    retry_count: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            });
            match result {
                Ok(connection) => Ok(Some(connection)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mirror the supervisor-owned fields of a connection row.
pub async fn update_connection_state(
    db: &Database,
    id: &str,
    status: ConnectionStatus,
    pairing_code: Option<&str>,
    retry_count: u32,
) -> Result<(), PalaverError> {
    let id = id.to_string();
    let status = status.to_string();
    let pairing_code = pairing_code.map(|c| c.to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE connections
                 SET status = ?2, pairing_code = ?3, retry_count = ?4,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id, status, pairing_code, retry_count],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
