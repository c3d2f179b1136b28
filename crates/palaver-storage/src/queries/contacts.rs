// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact CRUD operations.
//!
//! `contacts(tenant_id, address)` is unique; racing inserts surface as
//! [`PalaverError::Conflict`] and callers re-query.

use palaver_core::PalaverError;
use rusqlite::params;

use crate::database::Database;
use crate::models::Contact;

/// Insert a new contact.
pub async fn insert_contact(db: &Database, contact: &Contact) -> Result<(), PalaverError> {
    let contact = contact.clone();
    let detail = format!("address {}", contact.address);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO contacts (id, tenant_id, address, name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    contact.id,
                    contact.tenant_id,
                    contact.address,
                    contact.name,
                    contact.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| crate::database::map_insert_err(e, "contact", detail))
}

/// Find a contact by its normalized address within a tenant.
pub async fn find_contact_by_address(
    db: &Database,
    tenant_id: &str,
    address: &str,
) -> Result<Option<Contact>, PalaverError> {
    let tenant_id = tenant_id.to_string();
    let address = address.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, tenant_id, address, name, created_at
                 FROM contacts WHERE tenant_id = ?1 AND address = ?2",
            )?;
            let result = stmt.query_row(params![tenant_id, address], |row| {
                Ok(Contact {
                    id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    address: row.get(2)?,
                    name: row.get(3)?,
                    created_at: row.get(4)?,
                })
            });
            match result {
                Ok(contact) => Ok(Some(contact)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}
