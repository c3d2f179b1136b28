// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence contract for CRM entities.
//!
//! The authoritative guard against duplicate contacts/conversations is a
//! uniqueness constraint in the backing store; inserts racing on it return
//! [`PalaverError::Conflict`] and callers re-query for the winning row.

use async_trait::async_trait;

use crate::error::PalaverError;
use crate::types::{
    AutoMessageSchedule, BotCondition, BotFlow, BotInteraction, BotResponse, Connection,
    ConnectionStatus, Contact, Conversation, Message, MessageStatus,
};

/// Create/find/update operations on the entities the engine touches.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Initializes the backend (migrations, connection pool, etc.).
    async fn initialize(&self) -> Result<(), PalaverError>;

    /// Closes the backend, flushing pending writes.
    async fn close(&self) -> Result<(), PalaverError>;

    // --- Connections ---

    async fn insert_connection(&self, connection: &Connection) -> Result<(), PalaverError>;

    async fn get_connection(&self, id: &str) -> Result<Option<Connection>, PalaverError>;

    /// Mirror the supervisor-owned fields of a connection row.
    async fn update_connection_state(
        &self,
        id: &str,
        status: ConnectionStatus,
        pairing_code: Option<&str>,
        retry_count: u32,
    ) -> Result<(), PalaverError>;

    // --- Contacts ---

    async fn insert_contact(&self, contact: &Contact) -> Result<(), PalaverError>;

    async fn find_contact_by_address(
        &self,
        tenant_id: &str,
        address: &str,
    ) -> Result<Option<Contact>, PalaverError>;

    // --- Conversations ---

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), PalaverError>;

    async fn find_conversation(
        &self,
        contact_id: &str,
        connection_id: &str,
    ) -> Result<Option<Conversation>, PalaverError>;

    /// Update the last-message pointer and optionally increment unread count.
    async fn bump_conversation(
        &self,
        id: &str,
        last_message: &str,
        increment_unread: bool,
    ) -> Result<(), PalaverError>;

    /// Reset the unread counter (called by the CRUD layer on read).
    async fn reset_unread(&self, id: &str) -> Result<(), PalaverError>;

    /// Whether any message in the conversation carries the broadcast marker
    /// prefix (the one-shot greeting guard).
    async fn conversation_has_broadcast(
        &self,
        id: &str,
        marker: &str,
    ) -> Result<bool, PalaverError>;

    // --- Messages ---

    async fn insert_message(&self, message: &Message) -> Result<(), PalaverError>;

    async fn get_message(&self, id: &str) -> Result<Option<Message>, PalaverError>;

    /// Monotonic compare-and-set on the delivery-status hierarchy.
    ///
    /// Applies the update iff the stored status is not `failed` and sits at
    /// or below `status` in `sent < delivered < read`. Returns whether a row
    /// changed, making the operation idempotent under replay and safe under
    /// out-of-order delivery.
    async fn advance_message_status(
        &self,
        id: &str,
        status: MessageStatus,
        at: &str,
    ) -> Result<bool, PalaverError>;

    /// Patch the reaction field of a message. Returns whether a row changed.
    async fn set_message_reaction(
        &self,
        id: &str,
        reaction: Option<&str>,
    ) -> Result<bool, PalaverError>;

    // --- Auto-message schedules ---

    async fn insert_schedule(&self, schedule: &AutoMessageSchedule) -> Result<(), PalaverError>;

    /// Active schedules for a connection, in stored order.
    async fn list_active_schedules(
        &self,
        connection_id: &str,
    ) -> Result<Vec<AutoMessageSchedule>, PalaverError>;

    // --- Bot flows ---

    async fn insert_flow(&self, flow: &BotFlow) -> Result<(), PalaverError>;

    async fn insert_condition(&self, condition: &BotCondition) -> Result<(), PalaverError>;

    async fn insert_response(&self, response: &BotResponse) -> Result<(), PalaverError>;

    /// Active flows for a connection, priority descending, ties broken by
    /// creation order.
    async fn list_active_flows(&self, connection_id: &str) -> Result<Vec<BotFlow>, PalaverError>;

    /// Conditions of a flow in stored evaluation order.
    async fn list_conditions(&self, flow_id: &str) -> Result<Vec<BotCondition>, PalaverError>;

    /// Responses of a condition in ascending send order.
    async fn list_responses(&self, condition_id: &str)
    -> Result<Vec<BotResponse>, PalaverError>;

    // --- Bot interactions ---

    async fn insert_interaction(&self, interaction: &BotInteraction) -> Result<(), PalaverError>;

    /// Whether an interaction already exists for `(message_id, flow_id)`.
    async fn interaction_exists(
        &self,
        message_id: &str,
        flow_id: &str,
    ) -> Result<bool, PalaverError>;
}
