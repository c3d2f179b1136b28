// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot flow, condition, and response operations.

use palaver_core::PalaverError;
use rusqlite::params;

use crate::database::Database;
use crate::models::{BotCondition, BotFlow, BotResponse};

/// Insert a new flow.
pub async fn insert_flow(db: &Database, flow: &BotFlow) -> Result<(), PalaverError> {
    let flow = flow.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO bot_flows
                     (id, tenant_id, connection_id, name, active, priority, always_respond, stop_on_match, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    flow.id,
                    flow.tenant_id,
                    flow.connection_id,
                    flow.name,
                    flow.active,
                    flow.priority,
                    flow.always_respond,
                    flow.stop_on_match,
                    flow.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert a new condition.
pub async fn insert_condition(db: &Database, condition: &BotCondition) -> Result<(), PalaverError> {
    let condition = condition.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO bot_conditions
                     (id, flow_id, kind, operator, value, case_sensitive, regex_flags, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    condition.id,
                    condition.flow_id,
                    condition.kind.to_string(),
                    condition.operator.to_string(),
                    condition.value,
                    condition.case_sensitive,
                    condition.regex_flags,
                    condition.position,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert a new response.
pub async fn insert_response(db: &Database, response: &BotResponse) -> Result<(), PalaverError> {
    let response = response.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO bot_responses
                     (id, condition_id, body, media_url, delay_ms, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    response.id,
                    response.condition_id,
                    response.body,
                    response.media_url,
                    response.delay_ms,
                    response.position,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Active flows for a connection, priority descending, ties broken by
/// creation order.
pub async fn list_active_flows(
    db: &Database,
    connection_id: &str,
) -> Result<Vec<BotFlow>, PalaverError> {
    let connection_id = connection_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, tenant_id, connection_id, name, active, priority, always_respond, stop_on_match, created_at
                 FROM bot_flows
                 WHERE connection_id = ?1 AND active = 1
                 ORDER BY priority DESC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![connection_id], |row| {
                Ok(BotFlow {
                    id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    connection_id: row.get(2)?,
                    name: row.get(3)?,
                    active: row.get(4)?,
                    priority: row.get(5)?,
                    always_respond: row.get(6)?,
                    stop_on_match: row.get(7)?,
                    created_at: row.get(8)?,
                })
            })?;
            let mut flows = Vec::new();
            for row in rows {
                flows.push(row?);
            }
            Ok(flows)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Conditions of a flow in stored evaluation order.
pub async fn list_conditions(
    db: &Database,
    flow_id: &str,
) -> Result<Vec<BotCondition>, PalaverError> {
    let flow_id = flow_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, flow_id, kind, operator, value, case_sensitive, regex_flags, position
                 FROM bot_conditions
                 WHERE flow_id = ?1
                 ORDER BY position ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![flow_id], |row| {
                Ok(BotCondition {
                    id: row.get(0)?,
                    flow_id: row.get(1)?,
                    kind: super::parse_enum(row.get::<_, String>(2)?, 2)?,
                    operator: super::parse_enum(row.get::<_, String>(3)?, 3)?,
                    value: row.get(4)?,
                    case_sensitive: row.get(5)?,
                    regex_flags: row.get(6)?,
                    position: row.get(7)?,
                })
            })?;
            let mut conditions = Vec::new();
            for row in rows {
                conditions.push(row?);
            }
            Ok(conditions)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Responses of a condition in ascending send order.
pub async fn list_responses(
    db: &Database,
    condition_id: &str,
) -> Result<Vec<BotResponse>, PalaverError> {
    let condition_id = condition_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, condition_id, body, media_url, delay_ms, position
                 FROM bot_responses
                 WHERE condition_id = ?1
                 ORDER BY position ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![condition_id], |row| {
                Ok(BotResponse {
                    id: row.get(0)?,
                    condition_id: row.get(1)?,
                    body: row.get(2)?,
                    media_url: row.get(3)?,
                    delay_ms: row.get(4)?,
                    position: row.get(5)?,
                })
            })?;
            let mut responses = Vec::new();
            for row in rows {
                responses.push(row?);
            }
            Ok(responses)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
