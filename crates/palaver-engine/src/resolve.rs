// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Idempotent find-else-create for contacts and conversations.
//!
//! The storage layer's uniqueness constraints are the authoritative guard
//! against duplicates; a conflicting insert here means another event won
//! the race, so we re-query for the winning row instead of failing.

use std::sync::Arc;

use palaver_core::types::{Contact, Conversation};
use palaver_core::{PalaverError, Store};

/// Current wall-clock time in the stored timestamp format.
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Normalize a transport address for lookup and storage.
pub(crate) fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

pub(crate) async fn find_or_create_contact(
    store: &Arc<dyn Store>,
    tenant_id: &str,
    address: &str,
    name: Option<&str>,
) -> Result<Contact, PalaverError> {
    let address = normalize_address(address);
    if let Some(existing) = store.find_contact_by_address(tenant_id, &address).await? {
        return Ok(existing);
    }

    let contact = Contact {
        id: uuid::Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        address: address.clone(),
        name: name.map(str::to_string),
        created_at: now_rfc3339(),
    };
    match store.insert_contact(&contact).await {
        Ok(()) => Ok(contact),
        Err(e) if e.is_conflict() => store
            .find_contact_by_address(tenant_id, &address)
            .await?
            .ok_or_else(|| {
                PalaverError::Internal(format!(
                    "contact {address} conflicted on insert but is not retrievable"
                ))
            }),
        Err(e) => Err(e),
    }
}

pub(crate) async fn find_or_create_conversation(
    store: &Arc<dyn Store>,
    tenant_id: &str,
    contact_id: &str,
    connection_id: &str,
) -> Result<Conversation, PalaverError> {
    if let Some(existing) = store.find_conversation(contact_id, connection_id).await? {
        return Ok(existing);
    }

    let now = now_rfc3339();
    let conversation = Conversation {
        id: uuid::Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        contact_id: contact_id.to_string(),
        connection_id: connection_id.to_string(),
        unread_count: 0,
        last_message: None,
        created_at: now.clone(),
        updated_at: now,
    };
    match store.insert_conversation(&conversation).await {
        Ok(()) => Ok(conversation),
        Err(e) if e.is_conflict() => store
            .find_conversation(contact_id, connection_id)
            .await?
            .ok_or_else(|| {
                PalaverError::Internal(format!(
                    "conversation for contact {contact_id} conflicted on insert but is not retrievable"
                ))
            }),
        Err(e) => Err(e),
    }
}
