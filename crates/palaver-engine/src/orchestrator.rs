// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound message orchestration.
//!
//! One terminal pass per event: filter, resolve contact and conversation,
//! persist, broadcast (scheduled greeting strictly before bot replies),
//! evaluate flows, publish. The inbound message is always durably recorded
//! before any reply is attempted, and every reply failure is isolated to
//! that reply.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use palaver_core::types::{Direction, InboundEvent, Message, MessageStatus, Reaction};
use palaver_core::{PalaverError, RealtimePublisher, Store};
use palaver_session::SessionSupervisor;

use crate::flow::FlowMatcher;
use crate::resolve::{find_or_create_contact, find_or_create_conversation, now_rfc3339};
use crate::schedule::ScheduleMatcher;

pub struct InboundOrchestrator {
    store: Arc<dyn Store>,
    supervisor: Arc<SessionSupervisor>,
    publisher: Arc<dyn RealtimePublisher>,
    schedules: ScheduleMatcher,
    flows: FlowMatcher,
}

impl InboundOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        supervisor: Arc<SessionSupervisor>,
        publisher: Arc<dyn RealtimePublisher>,
    ) -> Self {
        Self {
            schedules: ScheduleMatcher::new(Arc::clone(&store)),
            flows: FlowMatcher::new(Arc::clone(&store)),
            store,
            supervisor,
            publisher,
        }
    }

    /// Process one inbound transport event to completion.
    pub async fn on_inbound(&self, event: InboundEvent) -> Result<(), PalaverError> {
        if let Some(reaction) = event.reaction.clone() {
            return self.on_reaction(&event, &reaction).await;
        }

        let text = event
            .body
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty());
        if event.from_me {
            debug!(message_id = %event.id, "discarding self-originated event");
            return Ok(());
        }
        if event.group {
            debug!(message_id = %event.id, "discarding group-origin event");
            return Ok(());
        }
        if text.is_none() && event.media_url.is_none() {
            debug!(message_id = %event.id, "discarding event with no content");
            return Ok(());
        }

        let connection = self
            .store
            .get_connection(&event.connection_id)
            .await?
            .ok_or_else(|| PalaverError::NotFound {
                entity: "connection",
                id: event.connection_id.clone(),
            })?;
        let tenant_id = connection.tenant_id.clone();

        let contact = find_or_create_contact(
            &self.store,
            &tenant_id,
            &event.sender_address,
            event.sender_name.as_deref(),
        )
        .await?;
        let conversation =
            find_or_create_conversation(&self.store, &tenant_id, &contact.id, &connection.id)
                .await?;

        let message = Message {
            id: event.id.clone(),
            tenant_id: tenant_id.clone(),
            connection_id: connection.id.clone(),
            conversation_id: conversation.id.clone(),
            contact_id: contact.id.clone(),
            direction: Direction::Inbound,
            body: text.unwrap_or_default().to_string(),
            media_url: event.media_url.clone(),
            media_kind: event.media_kind.clone(),
            status: MessageStatus::Received,
            reaction: None,
            sent_at: None,
            delivered_at: None,
            read_at: None,
            created_at: event.timestamp.clone(),
        };
        match self.store.insert_message(&message).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                debug!(message_id = %event.id, "duplicate inbound event, already processed");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let preview = text.unwrap_or("[media]");
        if let Err(e) = self
            .store
            .bump_conversation(&conversation.id, preview, true)
            .await
        {
            warn!(conversation_id = %conversation.id, error = %e, "failed to bump conversation");
        }

        // Scheduled greeting strictly before any bot reply.
        let now = chrono::Local::now().naive_local();
        match self
            .schedules
            .should_broadcast(&connection.id, &conversation.id, now)
            .await
        {
            Ok(Some(broadcast)) => {
                if let Err(e) = self
                    .send_and_record(
                        &tenant_id,
                        &connection.id,
                        &conversation.id,
                        &contact.id,
                        &contact.address,
                        &broadcast,
                        None,
                    )
                    .await
                {
                    warn!(conversation_id = %conversation.id, error = %e, "broadcast send failed");
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(connection_id = %connection.id, error = %e, "schedule matching failed");
            }
        }

        if let Some(text) = text {
            match self
                .flows
                .match_message(&connection.id, &tenant_id, &event.id, text)
                .await
            {
                Ok(Some(hit)) => {
                    for response in &hit.responses {
                        if response.delay_ms > 0 {
                            tokio::time::sleep(Duration::from_millis(response.delay_ms as u64))
                                .await;
                        }
                        if let Err(e) = self
                            .send_and_record(
                                &tenant_id,
                                &connection.id,
                                &conversation.id,
                                &contact.id,
                                &contact.address,
                                &response.body,
                                response.media_url.as_deref(),
                            )
                            .await
                        {
                            warn!(
                                response_id = %response.id,
                                flow_id = %hit.flow.id,
                                error = %e,
                                "bot reply failed, continuing with remaining replies"
                            );
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(connection_id = %connection.id, error = %e, "flow matching failed");
                }
            }
        }

        self.publish_message(&tenant_id, "message.created", &message)
            .await;
        Ok(())
    }

    /// Send an outbound message on behalf of the tenant.
    ///
    /// Resolves (or creates) the contact and conversation for the address,
    /// sends over the open session, persists the `from_me` copy as `sent`,
    /// and publishes it.
    pub async fn send_outbound(
        &self,
        connection_id: &str,
        address: &str,
        body: &str,
    ) -> Result<Message, PalaverError> {
        let connection = self
            .store
            .get_connection(connection_id)
            .await?
            .ok_or_else(|| PalaverError::NotFound {
                entity: "connection",
                id: connection_id.to_string(),
            })?;
        let contact =
            find_or_create_contact(&self.store, &connection.tenant_id, address, None).await?;
        let conversation = find_or_create_conversation(
            &self.store,
            &connection.tenant_id,
            &contact.id,
            &connection.id,
        )
        .await?;

        self.send_and_record(
            &connection.tenant_id,
            &connection.id,
            &conversation.id,
            &contact.id,
            &contact.address,
            body,
            None,
        )
        .await
    }

    /// Reaction sub-path: patch the target message and republish it.
    async fn on_reaction(
        &self,
        event: &InboundEvent,
        reaction: &Reaction,
    ) -> Result<(), PalaverError> {
        let Some(target) = self.store.get_message(&reaction.target_message_id).await? else {
            debug!(
                target_message_id = %reaction.target_message_id,
                "reaction for unknown message, dropping"
            );
            return Ok(());
        };

        // An empty emoji is a reaction removal.
        let emoji = Some(reaction.emoji.as_str()).filter(|e| !e.is_empty());
        let changed = self
            .store
            .set_message_reaction(&target.id, emoji)
            .await?;
        if !changed {
            return Ok(());
        }
        debug!(
            message_id = %target.id,
            connection_id = %event.connection_id,
            "reaction updated"
        );

        let payload = serde_json::json!({
            "id": target.id,
            "conversation_id": target.conversation_id,
            "reaction": emoji,
        });
        if let Err(e) = self
            .publisher
            .publish(&target.tenant_id, "message.updated", payload)
            .await
        {
            warn!(message_id = %target.id, error = %e, "realtime publish failed");
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_and_record(
        &self,
        tenant_id: &str,
        connection_id: &str,
        conversation_id: &str,
        contact_id: &str,
        address: &str,
        body: &str,
        media_url: Option<&str>,
    ) -> Result<Message, PalaverError> {
        let receipt = self.supervisor.send(connection_id, address, body).await?;

        let now = now_rfc3339();
        let message = Message {
            id: receipt.id,
            tenant_id: tenant_id.to_string(),
            connection_id: connection_id.to_string(),
            conversation_id: conversation_id.to_string(),
            contact_id: contact_id.to_string(),
            direction: Direction::FromMe,
            body: body.to_string(),
            media_url: media_url.map(str::to_string),
            media_kind: None,
            status: MessageStatus::Sent,
            reaction: None,
            sent_at: Some(now.clone()),
            delivered_at: None,
            read_at: None,
            created_at: now,
        };
        self.store.insert_message(&message).await?;
        if let Err(e) = self
            .store
            .bump_conversation(conversation_id, body, false)
            .await
        {
            warn!(conversation_id = %conversation_id, error = %e, "failed to bump conversation");
        }
        self.publish_message(tenant_id, "message.created", &message)
            .await;
        Ok(message)
    }

    async fn publish_message(&self, tenant_id: &str, event: &str, message: &Message) {
        let payload = serde_json::to_value(message).unwrap_or_default();
        if let Err(e) = self.publisher.publish(tenant_id, event, payload).await {
            warn!(message_id = %message.id, error = %e, "realtime publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_config::model::SessionConfig;
    use palaver_core::types::{
        Connection, ConnectionKind, ConnectionStatus, TransportEvent, TransportState,
    };
    use palaver_core::Transport;
    use palaver_storage::SqliteStore;
    use palaver_test_utils::{MemoryPublisher, MockTransport};
    use tokio::sync::mpsc;

    const NOW: &str = "2026-01-01T00:00:00.000Z";

    struct Harness {
        orchestrator: InboundOrchestrator,
        store: Arc<dyn Store>,
        transport: Arc<MockTransport>,
        publisher: Arc<MemoryPublisher>,
        supervisor: Arc<SessionSupervisor>,
    }

    async fn harness() -> Harness {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
        store
            .insert_connection(&Connection {
                id: "conn-1".to_string(),
                tenant_id: "tenant-1".to_string(),
                name: "support".to_string(),
                kind: ConnectionKind::Session,
                status: ConnectionStatus::Disconnected,
                pairing_code: None,
                retry_count: 0,
                created_at: NOW.to_string(),
                updated_at: NOW.to_string(),
            })
            .await
            .unwrap();

        let transport = MockTransport::new();
        let publisher = Arc::new(MemoryPublisher::new());
        let (tx, _rx) = mpsc::channel(64);
        let supervisor = Arc::new(SessionSupervisor::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&store),
            Arc::clone(&publisher) as Arc<dyn RealtimePublisher>,
            SessionConfig::default(),
            tx,
        ));
        let orchestrator = InboundOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&supervisor),
            Arc::clone(&publisher) as Arc<dyn RealtimePublisher>,
        );
        Harness {
            orchestrator,
            store,
            transport,
            publisher,
            supervisor,
        }
    }

    async fn open_session(h: &Harness) {
        h.transport
            .script_event(TransportEvent::StateChange {
                connection_id: "conn-1".to_string(),
                state: TransportState::Open,
            })
            .await;
        h.supervisor.start("conn-1").await.unwrap();
        for _ in 0..100 {
            if h.supervisor.is_open("conn-1").await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session did not open");
    }

    fn inbound(id: &str, body: Option<&str>) -> InboundEvent {
        InboundEvent {
            id: id.to_string(),
            connection_id: "conn-1".to_string(),
            sender_address: "User@C.Net".to_string(),
            sender_name: Some("Ada".to_string()),
            body: body.map(str::to_string),
            media_url: None,
            media_kind: None,
            from_me: false,
            group: false,
            reaction: None,
            timestamp: NOW.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_text_is_persisted_and_published() {
        let h = harness().await;
        h.orchestrator
            .on_inbound(inbound("m-1", Some("hola")))
            .await
            .unwrap();

        let message = h.store.get_message("m-1").await.unwrap().unwrap();
        assert_eq!(message.status, MessageStatus::Received);
        assert_eq!(message.direction, Direction::Inbound);

        let contact = h
            .store
            .find_contact_by_address("tenant-1", "user@c.net")
            .await
            .unwrap()
            .unwrap();
        let conversation = h
            .store
            .find_conversation(&contact.id, "conn-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.unread_count, 1);
        assert_eq!(conversation.last_message.as_deref(), Some("hola"));

        assert_eq!(h.publisher.events_named("message.created").await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn filters_discard_group_self_and_empty_events() {
        let h = harness().await;

        let mut group = inbound("m-1", Some("hola"));
        group.group = true;
        h.orchestrator.on_inbound(group).await.unwrap();

        let mut own = inbound("m-2", Some("hola"));
        own.from_me = true;
        h.orchestrator.on_inbound(own).await.unwrap();

        h.orchestrator.on_inbound(inbound("m-3", None)).await.unwrap();
        h.orchestrator
            .on_inbound(inbound("m-4", Some("   ")))
            .await
            .unwrap();

        for id in ["m-1", "m-2", "m-3", "m-4"] {
            assert!(h.store.get_message(id).await.unwrap().is_none());
        }
        assert!(h.publisher.events().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn media_without_text_is_persisted() {
        let h = harness().await;
        let mut event = inbound("m-1", None);
        event.media_url = Some("https://cdn.example/voice.ogg".to_string());
        event.media_kind = Some("audio".to_string());
        h.orchestrator.on_inbound(event).await.unwrap();

        let message = h.store.get_message("m-1").await.unwrap().unwrap();
        assert_eq!(message.body, "");
        assert_eq!(message.media_kind.as_deref(), Some("audio"));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_inbound_event_is_processed_once() {
        let h = harness().await;
        h.orchestrator
            .on_inbound(inbound("m-1", Some("hola")))
            .await
            .unwrap();
        h.orchestrator
            .on_inbound(inbound("m-1", Some("hola")))
            .await
            .unwrap();

        let contact = h
            .store
            .find_contact_by_address("tenant-1", "user@c.net")
            .await
            .unwrap()
            .unwrap();
        let conversation = h
            .store
            .find_conversation(&contact.id, "conn-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.unread_count, 1);
        assert_eq!(h.publisher.events_named("message.created").await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_failure_does_not_lose_the_inbound_message() {
        let h = harness().await;
        // Session closed: every reply send fails with NotConnected.
        use palaver_core::types::{BotCondition, BotFlow, BotResponse, ConditionKind, MatchOperator};
        h.store
            .insert_flow(&BotFlow {
                id: "flow-1".to_string(),
                tenant_id: "tenant-1".to_string(),
                connection_id: "conn-1".to_string(),
                name: "greeting".to_string(),
                active: true,
                priority: 0,
                always_respond: false,
                stop_on_match: true,
                created_at: NOW.to_string(),
            })
            .await
            .unwrap();
        h.store
            .insert_condition(&BotCondition {
                id: "cond-1".to_string(),
                flow_id: "flow-1".to_string(),
                kind: ConditionKind::Contains,
                operator: MatchOperator::Equals,
                value: "hola".to_string(),
                case_sensitive: false,
                regex_flags: None,
                position: 0,
            })
            .await
            .unwrap();
        h.store
            .insert_response(&BotResponse {
                id: "resp-1".to_string(),
                condition_id: "cond-1".to_string(),
                body: "Bienvenido".to_string(),
                media_url: None,
                delay_ms: 0,
                position: 0,
            })
            .await
            .unwrap();

        h.orchestrator
            .on_inbound(inbound("m-1", Some("hola")))
            .await
            .unwrap();

        // No reply went out, but the inbound message is durable and
        // published.
        assert_eq!(h.transport.sent_count().await, 0);
        assert!(h.store.get_message("m-1").await.unwrap().is_some());
        assert_eq!(h.publisher.events_named("message.created").await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reaction_patches_target_and_republishes() {
        let h = harness().await;
        h.orchestrator
            .on_inbound(inbound("m-1", Some("hola")))
            .await
            .unwrap();

        let mut event = inbound("r-1", None);
        event.reaction = Some(Reaction {
            target_message_id: "m-1".to_string(),
            emoji: "👍".to_string(),
        });
        h.orchestrator.on_inbound(event).await.unwrap();

        let message = h.store.get_message("m-1").await.unwrap().unwrap();
        assert_eq!(message.reaction.as_deref(), Some("👍"));
        assert_eq!(h.publisher.events_named("message.updated").await.len(), 1);

        // Empty emoji removes the reaction.
        let mut removal = inbound("r-2", None);
        removal.reaction = Some(Reaction {
            target_message_id: "m-1".to_string(),
            emoji: String::new(),
        });
        h.orchestrator.on_inbound(removal).await.unwrap();
        let message = h.store.get_message("m-1").await.unwrap().unwrap();
        assert!(message.reaction.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn send_outbound_persists_sent_copy() {
        let h = harness().await;
        open_session(&h).await;

        let message = h
            .orchestrator
            .send_outbound("conn-1", "User@C.Net", "order update")
            .await
            .unwrap();
        assert_eq!(message.direction, Direction::FromMe);
        assert_eq!(message.status, MessageStatus::Sent);
        assert!(message.sent_at.is_some());

        let sent = h.transport.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].address, "user@c.net");

        let stored = h.store.get_message(&message.id).await.unwrap().unwrap();
        assert_eq!(stored.body, "order update");
        assert_eq!(h.publisher.events_named("message.created").await.len(), 1);
    }
}
