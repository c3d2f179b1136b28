// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auto-message schedule operations.
//!
//! Weekday sets and time windows live in JSON columns; they are validated
//! into typed form once at load, not re-parsed per message.

use palaver_core::PalaverError;
use rusqlite::params;

use crate::database::Database;
use crate::models::{AutoMessageSchedule, TimeWindow};

/// Insert a new schedule.
pub async fn insert_schedule(
    db: &Database,
    schedule: &AutoMessageSchedule,
) -> Result<(), PalaverError> {
    let schedule = schedule.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO auto_message_schedules
                     (id, tenant_id, connection_id, body, active, days_of_week, windows, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    schedule.id,
                    schedule.tenant_id,
                    schedule.connection_id,
                    schedule.body,
                    schedule.active,
                    super::to_json_column(&schedule.days_of_week)?,
                    super::to_json_column(&schedule.windows)?,
                    schedule.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Active schedules for a connection, in stored order.
pub async fn list_active_schedules(
    db: &Database,
    connection_id: &str,
) -> Result<Vec<AutoMessageSchedule>, PalaverError> {
    let connection_id = connection_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, tenant_id, connection_id, body, active, days_of_week, windows, created_at
                 FROM auto_message_schedules
                 WHERE connection_id = ?1 AND active = 1
                 ORDER BY rowid ASC",
            )?;
            let rows = stmt.query_map(params![connection_id], |row| {
                Ok(AutoMessageSchedule {
                    id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    connection_id: row.get(2)?,
                    body: row.get(3)?,
                    active: row.get(4)?,
                    days_of_week: super::from_json_column::<Vec<u8>>(row.get::<_, String>(5)?, 5)?,
                    windows: super::from_json_column::<Vec<TimeWindow>>(
                        row.get::<_, String>(6)?,
                        6,
                    )?,
                    created_at: row.get(7)?,
                })
            })?;
            let mut schedules = Vec::new();
            for row in rows {
                schedules.push(row?);
            }
            Ok(schedules)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
