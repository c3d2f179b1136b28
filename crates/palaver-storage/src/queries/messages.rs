// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message CRUD operations, including the monotonic status advance.

use palaver_core::PalaverError;
use palaver_core::types::MessageStatus;
use rusqlite::params;

use crate::database::Database;
use crate::models::Message;

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        connection_id: row.get(2)?,
        conversation_id: row.get(3)?,
        contact_id: row.get(4)?,
        direction: super::parse_enum(row.get::<_, String>(5)?, 5)?,
        body: row.get(6)?,
        media_url: row.get(7)?,
        media_kind: row.get(8)?,
        status: super::parse_enum(row.get::<_, String>(9)?, 9)?,
        reaction: row.get(10)?,
        sent_at: row.get(11)?,
        delivered_at: row.get(12)?,
        read_at: row.get(13)?,
        created_at: row.get(14)?,
    })
}

const MESSAGE_COLUMNS: &str = "id, tenant_id, connection_id, conversation_id, contact_id, \
     direction, body, media_url, media_kind, status, reaction, \
     sent_at, delivered_at, read_at, created_at";

/// Insert a new message.
pub async fn insert_message(db: &Database, message: &Message) -> Result<(), PalaverError> {
    let detail = message_detail(message);
    let message = message.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages
                     (id, tenant_id, connection_id, conversation_id, contact_id,
                      direction, body, media_url, media_kind, status, reaction,
                      sent_at, delivered_at, read_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    message.id,
                    message.tenant_id,
                    message.connection_id,
                    message.conversation_id,
                    message.contact_id,
                    message.direction.to_string(),
                    message.body,
                    message.media_url,
                    message.media_kind,
                    message.status.to_string(),
                    message.reaction,
                    message.sent_at,
                    message.delivered_at,
                    message.read_at,
                    message.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| crate::database::map_insert_err(e, "message", detail))
}

fn message_detail(message: &Message) -> String {
    format!("id {}", message.id)
}

/// Get a message by id.
pub async fn get_message(db: &Database, id: &str) -> Result<Option<Message>, PalaverError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"))?;
            let result = stmt.query_row(params![id], row_to_message);
            match result {
                Ok(message) => Ok(Some(message)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Monotonic compare-and-set on the delivery-status hierarchy.
///
/// The WHERE clause ranks both the stored and the candidate status in
/// `sent < delivered < read` and only applies the update when the candidate
/// is at or above the stored rank. `failed` rows never change; a `failed`
/// candidate always applies to a non-failed row. Returns whether a row was
/// updated, so concurrent or replayed events are a no-op.
pub async fn advance_message_status(
    db: &Database,
    id: &str,
    status: MessageStatus,
    at: &str,
) -> Result<bool, PalaverError> {
    let id = id.to_string();
    let status = status.to_string();
    let at = at.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE messages
                 SET status = ?2,
                     sent_at = CASE WHEN ?2 = 'sent' THEN ?3 ELSE sent_at END,
                     delivered_at = CASE WHEN ?2 = 'delivered' THEN ?3 ELSE delivered_at END,
                     read_at = CASE WHEN ?2 = 'read' THEN ?3 ELSE read_at END
                 WHERE id = ?1
                   AND status != 'failed'
                   AND (?2 = 'failed'
                        OR CASE status
                               WHEN 'sent' THEN 0
                               WHEN 'delivered' THEN 1
                               WHEN 'read' THEN 2
                               ELSE -1
                           END
                           <= CASE ?2
                                  WHEN 'sent' THEN 0
                                  WHEN 'delivered' THEN 1
                                  WHEN 'read' THEN 2
                                  ELSE -1
                              END)",
                params![id, status, at],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Patch the reaction field of a message.
pub async fn set_message_reaction(
    db: &Database,
    id: &str,
    reaction: Option<&str>,
) -> Result<bool, PalaverError> {
    let id = id.to_string();
    let reaction = reaction.map(|r| r.to_string());
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE messages SET reaction = ?2 WHERE id = ?1",
                params![id, reaction],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Whether any message in the conversation starts with the broadcast marker.
pub async fn conversation_has_broadcast(
    db: &Database,
    conversation_id: &str,
    marker: &str,
) -> Result<bool, PalaverError> {
    let conversation_id = conversation_id.to_string();
    let prefix = format!("{marker}%");
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT EXISTS(
                     SELECT 1 FROM messages
                     WHERE conversation_id = ?1 AND body LIKE ?2
                 )",
            )?;
            stmt.query_row(params![conversation_id, prefix], |row| row.get(0))
        })
        .await
        .map_err(crate::database::map_tr_err)
}
