// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the `Store` trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use palaver_config::model::StorageConfig;
use palaver_core::types::{
    AutoMessageSchedule, BotCondition, BotFlow, BotInteraction, BotResponse, Connection,
    ConnectionStatus, Contact, Conversation, Message, MessageStatus,
};
use palaver_core::{PalaverError, Store};

use crate::database::Database;
use crate::queries;

/// SQLite-backed store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily initialized on the first
/// call to [`Store::initialize`].
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// Create a new SqliteStore with the given configuration.
    ///
    /// The database connection is not opened until [`Store::initialize`] is
    /// called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Create a store backed by an in-memory database, already initialized.
    ///
    /// Intended for tests and ephemeral engines.
    pub async fn in_memory() -> Result<Self, PalaverError> {
        let db = Database::open_in_memory().await?;
        let store = Self::new(StorageConfig {
            database_path: ":memory:".to_string(),
            wal_mode: false,
        });
        store
            .db
            .set(db)
            .map_err(|_| PalaverError::Internal("store already initialized".into()))?;
        Ok(store)
    }

    /// Returns the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, PalaverError> {
        self.db.get().ok_or_else(|| PalaverError::Storage {
            source: "store not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn initialize(&self) -> Result<(), PalaverError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| PalaverError::Storage {
            source: "store already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), PalaverError> {
        let db = self.db()?;
        // Checkpoint WAL before close.
        db.connection()
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Connections ---

    async fn insert_connection(&self, connection: &Connection) -> Result<(), PalaverError> {
        queries::connections::insert_connection(self.db()?, connection).await
    }

    async fn get_connection(&self, id: &str) -> Result<Option<Connection>, PalaverError> {
        queries::connections::get_connection(self.db()?, id).await
    }

    async fn update_connection_state(
        &self,
        id: &str,
        status: ConnectionStatus,
        pairing_code: Option<&str>,
        retry_count: u32,
    ) -> Result<(), PalaverError> {
        queries::connections::update_connection_state(self.db()?, id, status, pairing_code, retry_count)
            .await
    }

    // --- Contacts ---

    async fn insert_contact(&self, contact: &Contact) -> Result<(), PalaverError> {
        queries::contacts::insert_contact(self.db()?, contact).await
    }

    async fn find_contact_by_address(
        &self,
        tenant_id: &str,
        address: &str,
    ) -> Result<Option<Contact>, PalaverError> {
        queries::contacts::find_contact_by_address(self.db()?, tenant_id, address).await
    }

    // --- Conversations ---

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), PalaverError> {
        queries::conversations::insert_conversation(self.db()?, conversation).await
    }

    async fn find_conversation(
        &self,
        contact_id: &str,
        connection_id: &str,
    ) -> Result<Option<Conversation>, PalaverError> {
        queries::conversations::find_conversation(self.db()?, contact_id, connection_id).await
    }

    async fn bump_conversation(
        &self,
        id: &str,
        last_message: &str,
        increment_unread: bool,
    ) -> Result<(), PalaverError> {
        queries::conversations::bump_conversation(self.db()?, id, last_message, increment_unread)
            .await
    }

    async fn reset_unread(&self, id: &str) -> Result<(), PalaverError> {
        queries::conversations::reset_unread(self.db()?, id).await
    }

    async fn conversation_has_broadcast(
        &self,
        id: &str,
        marker: &str,
    ) -> Result<bool, PalaverError> {
        queries::messages::conversation_has_broadcast(self.db()?, id, marker).await
    }

    // --- Messages ---

    async fn insert_message(&self, message: &Message) -> Result<(), PalaverError> {
        queries::messages::insert_message(self.db()?, message).await
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, PalaverError> {
        queries::messages::get_message(self.db()?, id).await
    }

    async fn advance_message_status(
        &self,
        id: &str,
        status: MessageStatus,
        at: &str,
    ) -> Result<bool, PalaverError> {
        queries::messages::advance_message_status(self.db()?, id, status, at).await
    }

    async fn set_message_reaction(
        &self,
        id: &str,
        reaction: Option<&str>,
    ) -> Result<bool, PalaverError> {
        queries::messages::set_message_reaction(self.db()?, id, reaction).await
    }

    // --- Auto-message schedules ---

    async fn insert_schedule(&self, schedule: &AutoMessageSchedule) -> Result<(), PalaverError> {
        queries::schedules::insert_schedule(self.db()?, schedule).await
    }

    async fn list_active_schedules(
        &self,
        connection_id: &str,
    ) -> Result<Vec<AutoMessageSchedule>, PalaverError> {
        queries::schedules::list_active_schedules(self.db()?, connection_id).await
    }

    // --- Bot flows ---

    async fn insert_flow(&self, flow: &BotFlow) -> Result<(), PalaverError> {
        queries::flows::insert_flow(self.db()?, flow).await
    }

    async fn insert_condition(&self, condition: &BotCondition) -> Result<(), PalaverError> {
        queries::flows::insert_condition(self.db()?, condition).await
    }

    async fn insert_response(&self, response: &BotResponse) -> Result<(), PalaverError> {
        queries::flows::insert_response(self.db()?, response).await
    }

    async fn list_active_flows(&self, connection_id: &str) -> Result<Vec<BotFlow>, PalaverError> {
        queries::flows::list_active_flows(self.db()?, connection_id).await
    }

    async fn list_conditions(&self, flow_id: &str) -> Result<Vec<BotCondition>, PalaverError> {
        queries::flows::list_conditions(self.db()?, flow_id).await
    }

    async fn list_responses(
        &self,
        condition_id: &str,
    ) -> Result<Vec<BotResponse>, PalaverError> {
        queries::flows::list_responses(self.db()?, condition_id).await
    }

    // --- Bot interactions ---

    async fn insert_interaction(&self, interaction: &BotInteraction) -> Result<(), PalaverError> {
        queries::interactions::insert_interaction(self.db()?, interaction).await
    }

    async fn interaction_exists(
        &self,
        message_id: &str,
        flow_id: &str,
    ) -> Result<bool, PalaverError> {
        queries::interactions::interaction_exists(self.db()?, message_id, flow_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::types::{ConnectionKind, Direction, TimeWindow};

    const NOW: &str = "2026-01-01T00:00:00.000Z";

    fn make_connection(id: &str) -> Connection {
        Connection {
            id: id.to_string(),
            tenant_id: "tenant-1".to_string(),
            name: "support".to_string(),
            kind: ConnectionKind::Session,
            status: ConnectionStatus::Disconnected,
            pairing_code: None,
            retry_count: 0,
            created_at: NOW.to_string(),
            updated_at: NOW.to_string(),
        }
    }

    fn make_contact(id: &str, address: &str) -> Contact {
        Contact {
            id: id.to_string(),
            tenant_id: "tenant-1".to_string(),
            address: address.to_string(),
            name: Some("Ada".to_string()),
            created_at: NOW.to_string(),
        }
    }

    fn make_conversation(id: &str, contact_id: &str, connection_id: &str) -> Conversation {
        Conversation {
            id: id.to_string(),
            tenant_id: "tenant-1".to_string(),
            contact_id: contact_id.to_string(),
            connection_id: connection_id.to_string(),
            unread_count: 0,
            last_message: None,
            created_at: NOW.to_string(),
            updated_at: NOW.to_string(),
        }
    }

    fn make_message(id: &str, conversation_id: &str, body: &str) -> Message {
        Message {
            id: id.to_string(),
            tenant_id: "tenant-1".to_string(),
            connection_id: "conn-1".to_string(),
            conversation_id: conversation_id.to_string(),
            contact_id: "contact-1".to_string(),
            direction: Direction::Inbound,
            body: body.to_string(),
            media_url: None,
            media_kind: None,
            status: MessageStatus::Received,
            reaction: None,
            sent_at: None,
            delivered_at: None,
            read_at: None,
            created_at: NOW.to_string(),
        }
    }

    async fn seeded_store() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_connection(&make_connection("conn-1")).await.unwrap();
        store
            .insert_contact(&make_contact("contact-1", "5511999@c.net"))
            .await
            .unwrap();
        store
            .insert_conversation(&make_conversation("conv-1", "contact-1", "conn-1"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn uninitialized_store_rejects_queries() {
        let store = SqliteStore::new(StorageConfig {
            database_path: "unused.db".to_string(),
            wal_mode: false,
        });
        assert!(store.get_connection("conn-1").await.is_err());
    }

    #[tokio::test]
    async fn connection_round_trip_and_state_update() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_connection(&make_connection("conn-1")).await.unwrap();

        let loaded = store.get_connection("conn-1").await.unwrap().unwrap();
        assert_eq!(loaded.kind, ConnectionKind::Session);
        assert_eq!(loaded.status, ConnectionStatus::Disconnected);

        store
            .update_connection_state("conn-1", ConnectionStatus::Connecting, Some("1234-5678"), 1)
            .await
            .unwrap();
        let loaded = store.get_connection("conn-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, ConnectionStatus::Connecting);
        assert_eq!(loaded.pairing_code.as_deref(), Some("1234-5678"));
        assert_eq!(loaded.retry_count, 1);

        assert!(store.get_connection("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_contact_surfaces_conflict() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .insert_contact(&make_contact("contact-1", "5511999@c.net"))
            .await
            .unwrap();

        let err = store
            .insert_contact(&make_contact("contact-2", "5511999@c.net"))
            .await
            .unwrap_err();
        assert!(err.is_conflict(), "expected Conflict, got {err}");

        // The winning row is still retrievable by address.
        let found = store
            .find_contact_by_address("tenant-1", "5511999@c.net")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "contact-1");
    }

    #[tokio::test]
    async fn duplicate_conversation_surfaces_conflict() {
        let store = seeded_store().await;
        let err = store
            .insert_conversation(&make_conversation("conv-2", "contact-1", "conn-1"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn conversation_bump_and_reset() {
        let store = seeded_store().await;
        store.bump_conversation("conv-1", "hello", true).await.unwrap();
        store.bump_conversation("conv-1", "again", true).await.unwrap();

        let conv = store
            .find_conversation("contact-1", "conn-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conv.unread_count, 2);
        assert_eq!(conv.last_message.as_deref(), Some("again"));

        store.reset_unread("conv-1").await.unwrap();
        let conv = store
            .find_conversation("contact-1", "conn-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conv.unread_count, 0);
    }

    #[tokio::test]
    async fn message_status_never_regresses() {
        let store = seeded_store().await;
        let mut msg = make_message("m-1", "conv-1", "hi");
        msg.direction = Direction::FromMe;
        msg.status = MessageStatus::Sent;
        store.insert_message(&msg).await.unwrap();

        assert!(
            store
                .advance_message_status("m-1", MessageStatus::Read, NOW)
                .await
                .unwrap()
        );
        // Late delivered event is dropped.
        assert!(
            !store
                .advance_message_status("m-1", MessageStatus::Delivered, NOW)
                .await
                .unwrap()
        );
        let loaded = store.get_message("m-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, MessageStatus::Read);
        assert_eq!(loaded.read_at.as_deref(), Some(NOW));
        assert!(loaded.delivered_at.is_none());
    }

    #[tokio::test]
    async fn replayed_status_is_idempotent() {
        let store = seeded_store().await;
        let mut msg = make_message("m-1", "conv-1", "hi");
        msg.status = MessageStatus::Sent;
        store.insert_message(&msg).await.unwrap();

        assert!(
            store
                .advance_message_status("m-1", MessageStatus::Delivered, NOW)
                .await
                .unwrap()
        );
        // Replay applies again but leaves the same state.
        assert!(
            store
                .advance_message_status("m-1", MessageStatus::Delivered, NOW)
                .await
                .unwrap()
        );
        let loaded = store.get_message("m-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn failed_is_terminal() {
        let store = seeded_store().await;
        let mut msg = make_message("m-1", "conv-1", "hi");
        msg.status = MessageStatus::Sent;
        store.insert_message(&msg).await.unwrap();

        assert!(
            store
                .advance_message_status("m-1", MessageStatus::Failed, NOW)
                .await
                .unwrap()
        );
        assert!(
            !store
                .advance_message_status("m-1", MessageStatus::Read, NOW)
                .await
                .unwrap()
        );
        let loaded = store.get_message("m-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn reaction_patch() {
        let store = seeded_store().await;
        store
            .insert_message(&make_message("m-1", "conv-1", "hi"))
            .await
            .unwrap();

        assert!(store.set_message_reaction("m-1", Some("👍")).await.unwrap());
        let loaded = store.get_message("m-1").await.unwrap().unwrap();
        assert_eq!(loaded.reaction.as_deref(), Some("👍"));

        assert!(!store.set_message_reaction("missing", Some("👍")).await.unwrap());
    }

    #[tokio::test]
    async fn broadcast_guard_sees_marked_messages() {
        let store = seeded_store().await;
        assert!(!store.conversation_has_broadcast("conv-1", "\u{200e}").await.unwrap());

        store
            .insert_message(&make_message("m-1", "conv-1", "\u{200e}Welcome!"))
            .await
            .unwrap();
        assert!(store.conversation_has_broadcast("conv-1", "\u{200e}").await.unwrap());

        // Unmarked bodies do not trip the guard in another conversation.
        assert!(!store.conversation_has_broadcast("conv-2", "\u{200e}").await.unwrap());
    }

    #[tokio::test]
    async fn schedule_round_trip_preserves_windows() {
        let store = seeded_store().await;
        let schedule = AutoMessageSchedule {
            id: "sched-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            connection_id: "conn-1".to_string(),
            body: "We are open!".to_string(),
            active: true,
            days_of_week: vec![1, 2, 3, 4, 5],
            windows: vec![TimeWindow {
                from: "09:00".to_string(),
                to: "17:00".to_string(),
            }],
            created_at: NOW.to_string(),
        };
        store.insert_schedule(&schedule).await.unwrap();

        let inactive = AutoMessageSchedule {
            id: "sched-2".to_string(),
            active: false,
            ..schedule.clone()
        };
        store.insert_schedule(&inactive).await.unwrap();

        let loaded = store.list_active_schedules("conn-1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].days_of_week, vec![1, 2, 3, 4, 5]);
        assert_eq!(loaded[0].windows[0].from, "09:00");
    }

    #[tokio::test]
    async fn flows_ordered_by_priority_then_creation() {
        let store = seeded_store().await;
        for (id, priority) in [("flow-low", 5), ("flow-high", 10), ("flow-mid", 5)] {
            store
                .insert_flow(&BotFlow {
                    id: id.to_string(),
                    tenant_id: "tenant-1".to_string(),
                    connection_id: "conn-1".to_string(),
                    name: id.to_string(),
                    active: true,
                    priority,
                    always_respond: false,
                    stop_on_match: true,
                    created_at: NOW.to_string(),
                })
                .await
                .unwrap();
        }

        let flows = store.list_active_flows("conn-1").await.unwrap();
        let ids: Vec<&str> = flows.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["flow-high", "flow-low", "flow-mid"]);
    }

    #[tokio::test]
    async fn interactions_guard_round_trip() {
        let store = seeded_store().await;
        assert!(!store.interaction_exists("m-1", "flow-1").await.unwrap());

        store
            .insert_interaction(&BotInteraction {
                id: "int-1".to_string(),
                tenant_id: "tenant-1".to_string(),
                connection_id: "conn-1".to_string(),
                message_id: "m-1".to_string(),
                flow_id: Some("flow-1".to_string()),
                matched: true,
                responses_sent: 2,
                created_at: NOW.to_string(),
            })
            .await
            .unwrap();
        assert!(store.interaction_exists("m-1", "flow-1").await.unwrap());
        assert!(!store.interaction_exists("m-1", "flow-2").await.unwrap());
    }

    #[tokio::test]
    async fn initialize_opens_database_at_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("init_test.db");
        let store = SqliteStore::new(StorageConfig {
            database_path: db_path.to_str().unwrap().to_string(),
            wal_mode: true,
        });

        store.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
        store.close().await.unwrap();

        let result = store.initialize().await;
        assert!(result.is_err(), "second initialize should fail");
    }
}
