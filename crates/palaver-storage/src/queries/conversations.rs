// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation CRUD operations.
//!
//! `conversations(contact_id, connection_id)` is unique; racing inserts
//! surface as [`PalaverError::Conflict`] and callers re-query.

use palaver_core::PalaverError;
use rusqlite::params;

use crate::database::Database;
use crate::models::Conversation;

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        contact_id: row.get(2)?,
        connection_id: row.get(3)?,
        unread_count: row.get(4)?,
        last_message: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Insert a new conversation.
pub async fn insert_conversation(
    db: &Database,
    conversation: &Conversation,
) -> Result<(), PalaverError> {
    let conversation = conversation.clone();
    let detail = format!(
        "contact {} on connection {}",
        conversation.contact_id, conversation.connection_id
    );
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversations
                     (id, tenant_id, contact_id, connection_id, unread_count, last_message, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    conversation.id,
                    conversation.tenant_id,
                    conversation.contact_id,
                    conversation.connection_id,
                    conversation.unread_count,
                    conversation.last_message,
                    conversation.created_at,
                    conversation.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| crate::database::map_insert_err(e, "conversation", detail))
}

/// Find the conversation for a contact+connection pair.
pub async fn find_conversation(
    db: &Database,
    contact_id: &str,
    connection_id: &str,
) -> Result<Option<Conversation>, PalaverError> {
    let contact_id = contact_id.to_string();
    let connection_id = connection_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, tenant_id, contact_id, connection_id, unread_count, last_message, created_at, updated_at
                 FROM conversations WHERE contact_id = ?1 AND connection_id = ?2",
            )?;
            let result = stmt.query_row(params![contact_id, connection_id], row_to_conversation);
            match result {
                Ok(conversation) => Ok(Some(conversation)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Update the last-message pointer and optionally increment unread count.
pub async fn bump_conversation(
    db: &Database,
    id: &str,
    last_message: &str,
    increment_unread: bool,
) -> Result<(), PalaverError> {
    let id = id.to_string();
    let last_message = last_message.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations
                 SET last_message = ?2,
                     unread_count = unread_count + ?3,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id, last_message, i64::from(increment_unread)],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Reset the unread counter.
pub async fn reset_unread(db: &Database, id: &str) -> Result<(), PalaverError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE conversations SET unread_count = 0 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
