// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery-status reconciliation.
//!
//! Transport ack codes map onto the stored hierarchy `sent < delivered <
//! read` (plus terminal `failed`). Writes go through the store's monotonic
//! compare-and-set, which makes them idempotent under replay and safe when
//! the transport delivers acks out of order; a rejected regression is
//! logged, never an error.

use std::sync::Arc;

use tracing::{debug, warn};

use palaver_core::types::{ack_to_status, Direction, Message, MessageStatus, StatusEvent};
use palaver_core::{PalaverError, RealtimePublisher, Store};

use crate::resolve::{find_or_create_contact, find_or_create_conversation, now_rfc3339};

pub struct StatusReconciler {
    store: Arc<dyn Store>,
    publisher: Arc<dyn RealtimePublisher>,
}

impl StatusReconciler {
    pub fn new(store: Arc<dyn Store>, publisher: Arc<dyn RealtimePublisher>) -> Self {
        Self { store, publisher }
    }

    /// Apply one delivery-status event.
    ///
    /// Unknown or pending ack codes are ignored. Events referencing a
    /// message id not in storage are dropped unless they are echoes of the
    /// owning tenant's own sends (another client instance of the same
    /// account), in which case a placeholder message is synthesized so the
    /// conversation view stays complete.
    pub async fn apply(&self, event: &StatusEvent) -> Result<(), PalaverError> {
        let Some(status) = ack_to_status(event.code) else {
            debug!(
                message_id = %event.message_id,
                code = event.code,
                "ignoring pending/unknown ack code"
            );
            return Ok(());
        };

        match self.store.get_message(&event.message_id).await? {
            Some(message) => self.advance(&message, status).await,
            None if event.from_me => self.synthesize_placeholder(event, status).await,
            None => {
                debug!(
                    message_id = %event.message_id,
                    "status event for unknown message, dropping"
                );
                Ok(())
            }
        }
    }

    async fn advance(&self, message: &Message, status: MessageStatus) -> Result<(), PalaverError> {
        let changed = self
            .store
            .advance_message_status(&message.id, status, &now_rfc3339())
            .await?;
        if !changed {
            debug!(
                message_id = %message.id,
                current = %message.status,
                rejected = %status,
                "rejected status regression"
            );
            return Ok(());
        }

        let payload = serde_json::json!({
            "id": message.id,
            "conversation_id": message.conversation_id,
            "status": status.to_string(),
        });
        if let Err(e) = self
            .publisher
            .publish(&message.tenant_id, "message.updated", payload)
            .await
        {
            warn!(message_id = %message.id, error = %e, "realtime publish failed");
        }
        Ok(())
    }

    /// Record an own-account echo the engine never saw being sent.
    ///
    /// Content is recovered best-effort from whatever the transport cached
    /// in the event; an empty body still anchors the status timeline.
    async fn synthesize_placeholder(
        &self,
        event: &StatusEvent,
        status: MessageStatus,
    ) -> Result<(), PalaverError> {
        let Some(chat_address) = event.chat_address.as_deref() else {
            debug!(
                message_id = %event.message_id,
                "own-account echo without chat address, cannot synthesize"
            );
            return Ok(());
        };
        let Some(connection) = self.store.get_connection(&event.connection_id).await? else {
            warn!(
                connection_id = %event.connection_id,
                "status event for unknown connection"
            );
            return Ok(());
        };

        let contact =
            find_or_create_contact(&self.store, &connection.tenant_id, chat_address, None).await?;
        let conversation = find_or_create_conversation(
            &self.store,
            &connection.tenant_id,
            &contact.id,
            &connection.id,
        )
        .await?;

        let now = now_rfc3339();
        let body = event.body.clone().unwrap_or_default();
        let message = Message {
            id: event.message_id.clone(),
            tenant_id: connection.tenant_id.clone(),
            connection_id: connection.id.clone(),
            conversation_id: conversation.id.clone(),
            contact_id: contact.id,
            direction: Direction::FromMe,
            body: body.clone(),
            media_url: None,
            media_kind: None,
            status,
            reaction: None,
            sent_at: Some(now.clone()),
            delivered_at: (status == MessageStatus::Delivered || status == MessageStatus::Read)
                .then(|| now.clone()),
            read_at: (status == MessageStatus::Read).then(|| now.clone()),
            created_at: now,
        };
        match self.store.insert_message(&message).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                // Lost a race with another event for the same echo; the
                // winner's row takes the status through the normal path.
                return Box::pin(self.apply(event)).await;
            }
            Err(e) => return Err(e),
        }
        if !body.is_empty() {
            self.store
                .bump_conversation(&conversation.id, &body, false)
                .await?;
        }

        debug!(
            message_id = %message.id,
            connection_id = %connection.id,
            status = %status,
            "synthesized placeholder for own-account echo"
        );
        let payload = serde_json::to_value(&message).unwrap_or_default();
        if let Err(e) = self
            .publisher
            .publish(&connection.tenant_id, "message.created", payload)
            .await
        {
            warn!(message_id = %message.id, error = %e, "realtime publish failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::types::{Connection, ConnectionKind, ConnectionStatus, Contact, Conversation};
    use palaver_storage::SqliteStore;
    use palaver_test_utils::MemoryPublisher;

    const NOW: &str = "2026-01-01T00:00:00.000Z";

    struct Fixture {
        reconciler: StatusReconciler,
        store: Arc<dyn Store>,
        publisher: Arc<MemoryPublisher>,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
        store
            .insert_connection(&Connection {
                id: "conn-1".to_string(),
                tenant_id: "tenant-1".to_string(),
                name: "support".to_string(),
                kind: ConnectionKind::Session,
                status: ConnectionStatus::Connected,
                pairing_code: None,
                retry_count: 0,
                created_at: NOW.to_string(),
                updated_at: NOW.to_string(),
            })
            .await
            .unwrap();
        store
            .insert_contact(&Contact {
                id: "contact-1".to_string(),
                tenant_id: "tenant-1".to_string(),
                address: "user@c.net".to_string(),
                name: None,
                created_at: NOW.to_string(),
            })
            .await
            .unwrap();
        store
            .insert_conversation(&Conversation {
                id: "conv-1".to_string(),
                tenant_id: "tenant-1".to_string(),
                contact_id: "contact-1".to_string(),
                connection_id: "conn-1".to_string(),
                unread_count: 0,
                last_message: None,
                created_at: NOW.to_string(),
                updated_at: NOW.to_string(),
            })
            .await
            .unwrap();

        let publisher = Arc::new(MemoryPublisher::new());
        let reconciler = StatusReconciler::new(
            Arc::clone(&store),
            Arc::clone(&publisher) as Arc<dyn RealtimePublisher>,
        );
        Fixture {
            reconciler,
            store,
            publisher,
        }
    }

    async fn seed_sent_message(store: &Arc<dyn Store>, id: &str) {
        store
            .insert_message(&Message {
                id: id.to_string(),
                tenant_id: "tenant-1".to_string(),
                connection_id: "conn-1".to_string(),
                conversation_id: "conv-1".to_string(),
                contact_id: "contact-1".to_string(),
                direction: Direction::FromMe,
                body: "hello".to_string(),
                media_url: None,
                media_kind: None,
                status: MessageStatus::Sent,
                reaction: None,
                sent_at: Some(NOW.to_string()),
                delivered_at: None,
                read_at: None,
                created_at: NOW.to_string(),
            })
            .await
            .unwrap();
    }

    fn status_event(message_id: &str, code: i64) -> StatusEvent {
        StatusEvent {
            connection_id: "conn-1".to_string(),
            message_id: message_id.to_string(),
            code,
            from_me: true,
            chat_address: Some("user@c.net".to_string()),
            body: None,
        }
    }

    #[tokio::test]
    async fn final_status_is_maximum_reached() {
        let f = fixture().await;
        seed_sent_message(&f.store, "m-1").await;

        // read, then a late delivered: the regression is dropped.
        f.reconciler.apply(&status_event("m-1", 4)).await.unwrap();
        f.reconciler.apply(&status_event("m-1", 3)).await.unwrap();

        let message = f.store.get_message("m-1").await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Read);
        // Only the read advance published an update.
        assert_eq!(f.publisher.events_named("message.updated").await.len(), 1);
    }

    #[tokio::test]
    async fn pending_codes_are_ignored() {
        let f = fixture().await;
        seed_sent_message(&f.store, "m-1").await;
        f.reconciler.apply(&status_event("m-1", 1)).await.unwrap();
        let message = f.store.get_message("m-1").await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn failure_ack_is_terminal() {
        let f = fixture().await;
        seed_sent_message(&f.store, "m-1").await;
        f.reconciler.apply(&status_event("m-1", 0)).await.unwrap();
        f.reconciler.apply(&status_event("m-1", 4)).await.unwrap();
        let message = f.store.get_message("m-1").await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn own_echo_synthesizes_placeholder() {
        let f = fixture().await;
        let mut event = status_event("echo-1", 3);
        event.body = Some("sent from phone".to_string());

        f.reconciler.apply(&event).await.unwrap();

        let message = f.store.get_message("echo-1").await.unwrap().unwrap();
        assert_eq!(message.direction, Direction::FromMe);
        assert_eq!(message.status, MessageStatus::Delivered);
        assert_eq!(message.body, "sent from phone");
        assert_eq!(message.conversation_id, "conv-1");
        assert_eq!(f.publisher.events_named("message.created").await.len(), 1);
    }

    #[tokio::test]
    async fn foreign_unknown_message_is_dropped() {
        let f = fixture().await;
        let mut event = status_event("ghost-1", 3);
        event.from_me = false;

        f.reconciler.apply(&event).await.unwrap();
        assert!(f.store.get_message("ghost-1").await.unwrap().is_none());
        assert!(f.publisher.events().await.is_empty());
    }
}
