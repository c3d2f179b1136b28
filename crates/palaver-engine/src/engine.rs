// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The engine facade: the upward API consumed by the CRUD layer.
//!
//! Wires the session supervisor, inbound orchestrator, and status
//! reconciler together and runs the event dispatch loop: one worker task
//! per connection id, so events for the same connection process in arrival
//! order while different connections proceed fully in parallel.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use palaver_config::model::PalaverConfig;
use palaver_core::types::{Message, TransportEvent};
use palaver_core::{PalaverError, RealtimePublisher, Store, Transport};
use palaver_session::{SessionState, SessionSupervisor};

use crate::orchestrator::InboundOrchestrator;
use crate::status::StatusReconciler;

pub struct Engine {
    supervisor: Arc<SessionSupervisor>,
    orchestrator: Arc<InboundOrchestrator>,
    reconciler: Arc<StatusReconciler>,
    store: Arc<dyn Store>,
    workers: DashMap<String, mpsc::Sender<TransportEvent>>,
    queue_capacity: usize,
    dispatcher: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Build the engine and start its dispatch loop.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        publisher: Arc<dyn RealtimePublisher>,
        config: &PalaverConfig,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(config.engine.event_queue_capacity);
        let supervisor = Arc::new(SessionSupervisor::new(
            transport,
            Arc::clone(&store),
            Arc::clone(&publisher),
            config.session.clone(),
            events_tx,
        ));
        let orchestrator = Arc::new(InboundOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&supervisor),
            Arc::clone(&publisher),
        ));
        let reconciler = Arc::new(StatusReconciler::new(
            Arc::clone(&store),
            Arc::clone(&publisher),
        ));

        let engine = Arc::new(Self {
            supervisor,
            orchestrator,
            reconciler,
            store,
            workers: DashMap::new(),
            queue_capacity: config.engine.event_queue_capacity,
            dispatcher: std::sync::Mutex::new(None),
        });

        let dispatch = Arc::clone(&engine);
        let handle = tokio::spawn(async move {
            dispatch.dispatch_loop(events_rx).await;
        });
        if let Ok(mut slot) = engine.dispatcher.lock() {
            *slot = Some(handle);
        }
        info!("engine started");
        engine
    }

    /// Start the transport session for a connection.
    pub async fn start_connection(&self, connection_id: &str) -> Result<SessionState, PalaverError> {
        self.supervisor.start(connection_id).await
    }

    /// Stop the transport session for a connection.
    pub async fn stop_connection(&self, connection_id: &str) -> Result<(), PalaverError> {
        self.supervisor.stop(connection_id).await
    }

    pub async fn connection_state(&self, connection_id: &str) -> SessionState {
        self.supervisor.connection_state(connection_id).await
    }

    /// Wait for a pairing/QR credential while a connection is connecting.
    pub async fn wait_for_pairing_code(
        &self,
        connection_id: &str,
        timeout: Option<Duration>,
    ) -> Result<String, PalaverError> {
        self.supervisor
            .wait_for_pairing_code(connection_id, timeout)
            .await
    }

    /// Send a message from the tenant's account and persist the copy.
    pub async fn send_outbound_message(
        &self,
        connection_id: &str,
        address: &str,
        body: &str,
    ) -> Result<Message, PalaverError> {
        self.orchestrator
            .send_outbound(connection_id, address, body)
            .await
    }

    /// Tear down: stop every live session, the dispatch loop, and storage.
    pub async fn shutdown(&self) -> Result<(), PalaverError> {
        // Live sessions come from the supervisor, not the worker map: a
        // worker only exists once a connection has dispatched an event.
        for id in self.supervisor.active_connection_ids().await {
            if let Err(e) = self.supervisor.stop(&id).await {
                warn!(connection_id = %id, error = %e, "stop failed during shutdown");
            }
        }
        if let Ok(mut slot) = self.dispatcher.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        self.workers.clear();
        self.store.close().await?;
        info!("engine shut down");
        Ok(())
    }

    async fn dispatch_loop(self: Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            let connection_id = event.connection_id().to_string();
            let worker = self.worker(&connection_id);
            if worker.send(event).await.is_err() {
                warn!(connection_id = %connection_id, "connection worker gone, dropping event");
                self.workers.remove(&connection_id);
            }
        }
        debug!("event stream closed, dispatch loop exiting");
    }

    /// Get or spawn the in-order worker for a connection id.
    fn worker(&self, connection_id: &str) -> mpsc::Sender<TransportEvent> {
        if let Some(existing) = self.workers.get(connection_id) {
            return existing.clone();
        }

        let (tx, mut rx) = mpsc::channel::<TransportEvent>(self.queue_capacity);
        self.workers.insert(connection_id.to_string(), tx.clone());

        let orchestrator = Arc::clone(&self.orchestrator);
        let reconciler = Arc::clone(&self.reconciler);
        let id = connection_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    TransportEvent::Inbound(inbound) => {
                        if let Err(e) = orchestrator.on_inbound(inbound).await {
                            warn!(connection_id = %id, error = %e, "inbound event failed");
                        }
                    }
                    TransportEvent::StatusUpdate(status) => {
                        if let Err(e) = reconciler.apply(&status).await {
                            warn!(connection_id = %id, error = %e, "status event failed");
                        }
                    }
                    // Lifecycle events are consumed by the supervisor and
                    // never reach the sink.
                    TransportEvent::PairingCode { .. } | TransportEvent::StateChange { .. } => {}
                }
            }
        });
        tx
    }
}
