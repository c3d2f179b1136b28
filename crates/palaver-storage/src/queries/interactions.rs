// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot interaction audit-trail operations. Append-only.

use palaver_core::PalaverError;
use rusqlite::params;

use crate::database::Database;
use crate::models::BotInteraction;

/// Record an interaction.
pub async fn insert_interaction(
    db: &Database,
    interaction: &BotInteraction,
) -> Result<(), PalaverError> {
    let interaction = interaction.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO bot_interactions
                     (id, tenant_id, connection_id, message_id, flow_id, matched, responses_sent, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    interaction.id,
                    interaction.tenant_id,
                    interaction.connection_id,
                    interaction.message_id,
                    interaction.flow_id,
                    interaction.matched,
                    interaction.responses_sent,
                    interaction.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Whether an interaction already exists for `(message_id, flow_id)`.
pub async fn interaction_exists(
    db: &Database,
    message_id: &str,
    flow_id: &str,
) -> Result<bool, PalaverError> {
    let message_id = message_id.to_string();
    let flow_id = flow_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT EXISTS(
                     SELECT 1 FROM bot_interactions
                     WHERE message_id = ?1 AND flow_id = ?2
                 )",
            )?;
            stmt.query_row(params![message_id, flow_id], |row| row.get(0))
        })
        .await
        .map_err(crate::database::map_tr_err)
}
