// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use palaver_core::PalaverError;
use tracing::debug;

use crate::migrations;

/// Handle to the single SQLite connection backing the store.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run
    /// pending migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, PalaverError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| map_tr_err(e.into()))?;
        Self::setup(conn, wal_mode).await
    }

    /// Open an in-memory database. Used by tests and ephemeral engines.
    pub async fn open_in_memory() -> Result<Self, PalaverError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| map_tr_err(e.into()))?;
        Self::setup(conn, false).await
    }

    async fn setup(
        conn: tokio_rusqlite::Connection,
        wal_mode: bool,
    ) -> Result<Self, PalaverError> {
        conn.call(move |conn| {
            if wal_mode {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "busy_timeout", 5_000)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        // Run embedded migrations on the same connection so in-memory
        // databases work too.
        conn.call(move |conn| Ok(migrations::run_migrations(conn)))
            .await
            .map_err(map_tr_err)??;

        debug!(wal_mode, "database ready");
        Ok(Self { conn })
    }

    /// The single background connection. All query modules go through this.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }
}

/// Map a tokio-rusqlite error into the shared storage error.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> PalaverError {
    PalaverError::Storage {
        source: Box::new(e),
    }
}

/// Map an insert error, translating unique-constraint violations into
/// [`PalaverError::Conflict`] so callers can re-query for the winning row.
pub fn map_insert_err(
    e: tokio_rusqlite::Error,
    entity: &'static str,
    detail: String,
) -> PalaverError {
    if let tokio_rusqlite::Error::Error(rusqlite::Error::SqliteFailure(failure, _)) = &e
        && failure.code == rusqlite::ErrorCode::ConstraintViolation
    {
        return PalaverError::Conflict { entity, detail };
    }
    map_tr_err(e)
}
