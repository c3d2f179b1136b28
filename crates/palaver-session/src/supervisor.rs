// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-connection session state machine.
//!
//! Each connection id goes through states: `idle -> connecting -> open`,
//! dropping back through `reconnecting` (bounded retries with exponential
//! backoff) or to terminal `idle` on logout or retry exhaustion.
//!
//! One `SessionSupervisor` instance owns all per-connection state; there are
//! no process-level globals. Transitions for a single connection id are
//! serialized by a per-entry mutex, and every reconnect timer is owned by
//! the entry that scheduled it so cancellation is always paired with the
//! owning transition.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use palaver_config::model::SessionConfig;
use palaver_core::types::{
    ConnectionStatus, DisconnectReason, SentReceipt, TransportEvent, TransportState,
};
use palaver_core::{PalaverError, RealtimePublisher, Store, Transport};

use crate::backoff::reconnect_delay;

/// Externally observable state of a connection's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No live session and nothing scheduled.
    Idle,
    /// A transport session is being established.
    Connecting,
    /// The session is open and can send.
    Open,
    /// Closed unexpectedly; a reconnect attempt is scheduled.
    Reconnecting,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Open => write!(f, "open"),
            SessionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Mutable per-connection state, guarded by the entry mutex.
struct EntryState {
    state: SessionState,
    /// When the current `connecting` attempt began; backs the advisory
    /// start lock.
    connecting_since: Option<Instant>,
    retry_count: u32,
    /// Bumped on every new session and on `stop`; stale pump tasks and
    /// timers check it before acting.
    generation: u64,
    tenant_id: Option<String>,
    reconnect_timer: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
}

struct SessionEntry {
    state: Mutex<EntryState>,
    /// Latest pairing/QR credential while `connecting`; cleared on open.
    pairing: watch::Sender<Option<String>>,
}

impl SessionEntry {
    fn new() -> Self {
        let (pairing, _) = watch::channel(None);
        Self {
            state: Mutex::new(EntryState {
                state: SessionState::Idle,
                connecting_since: None,
                retry_count: 0,
                generation: 0,
                tenant_id: None,
                reconnect_timer: None,
                pump: None,
            }),
            pairing,
        }
    }
}

/// Supervises transport sessions, one state machine per connection id.
///
/// Owns session establishment, pairing-code surfacing, bounded-retry
/// reconnection with exponential backoff, and teardown. Inbound and
/// delivery-status events are forwarded untouched to the event sink given
/// at construction; state mirroring to storage and realtime publishing are
/// best-effort and never block a transition.
pub struct SessionSupervisor {
    transport: Arc<dyn Transport>,
    store: Arc<dyn Store>,
    publisher: Arc<dyn RealtimePublisher>,
    config: SessionConfig,
    entries: DashMap<String, Arc<SessionEntry>>,
    events: mpsc::Sender<TransportEvent>,
}

impl SessionSupervisor {
    /// Create a supervisor forwarding inbound/status events to `events`.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        publisher: Arc<dyn RealtimePublisher>,
        config: SessionConfig,
        events: mpsc::Sender<TransportEvent>,
    ) -> Self {
        Self {
            transport,
            store,
            publisher,
            config,
            entries: DashMap::new(),
            events,
        }
    }

    fn entry(&self, connection_id: &str) -> Option<Arc<SessionEntry>> {
        self.entries
            .get(connection_id)
            .map(|e| Arc::clone(e.value()))
    }

    fn start_lock(&self) -> Duration {
        Duration::from_millis(self.config.start_lock_ms)
    }

    /// Start (or join) the session for a connection.
    ///
    /// No-op when already `open`. When another `start` is already
    /// `connecting` within the advisory lock window, the in-flight attempt
    /// is joined instead of re-initiating. An explicit `start` cancels any
    /// pending reconnect timer and resets the retry counter.
    pub async fn start(
        self: &Arc<Self>,
        connection_id: &str,
    ) -> Result<SessionState, PalaverError> {
        let record = self
            .store
            .get_connection(connection_id)
            .await?
            .ok_or_else(|| PalaverError::NotFound {
                entity: "connection",
                id: connection_id.to_string(),
            })?;

        let entry = Arc::clone(
            self.entries
                .entry(connection_id.to_string())
                .or_insert_with(|| Arc::new(SessionEntry::new()))
                .value(),
        );
        let mut state = entry.state.lock().await;
        state.tenant_id = Some(record.tenant_id);

        match state.state {
            SessionState::Open => {
                debug!(connection_id = %connection_id, "start ignored, session already open");
                return Ok(SessionState::Open);
            }
            SessionState::Connecting => {
                let lock = self.start_lock();
                if state.connecting_since.is_some_and(|since| since.elapsed() < lock) {
                    debug!(
                        connection_id = %connection_id,
                        "start already in flight, joining existing attempt"
                    );
                    return Ok(SessionState::Connecting);
                }
            }
            SessionState::Idle | SessionState::Reconnecting => {}
        }

        if let Some(timer) = state.reconnect_timer.take() {
            timer.abort();
        }
        state.retry_count = 0;

        self.spawn_session(connection_id, &mut state).await?;

        let tenant = state.tenant_id.clone();
        self.report_state(
            tenant.as_deref(),
            connection_id,
            ConnectionStatus::Connecting,
            None,
            0,
        )
        .await;
        info!(connection_id = %connection_id, "session starting");
        Ok(SessionState::Connecting)
    }

    /// Force teardown: best-effort transport logout, then `idle` regardless
    /// of the teardown outcome, cancelling any pending reconnect timer.
    pub async fn stop(self: &Arc<Self>, connection_id: &str) -> Result<(), PalaverError> {
        let Some(entry) = self.entry(connection_id) else {
            return Ok(());
        };
        let mut state = entry.state.lock().await;
        state.generation += 1;
        if let Some(timer) = state.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(pump) = state.pump.take() {
            pump.abort();
        }
        if let Err(e) = self.transport.logout(connection_id).await {
            warn!(connection_id = %connection_id, error = %e, "transport logout failed during stop");
        }
        state.state = SessionState::Idle;
        state.connecting_since = None;
        state.retry_count = 0;
        let _ = entry.pairing.send_replace(None);
        let tenant = state.tenant_id.clone();
        drop(state);

        self.report_state(
            tenant.as_deref(),
            connection_id,
            ConnectionStatus::Disconnected,
            None,
            0,
        )
        .await;
        info!(connection_id = %connection_id, "session stopped");
        Ok(())
    }

    /// Current session state; unknown connections report `idle`.
    pub async fn connection_state(&self, connection_id: &str) -> SessionState {
        match self.entry(connection_id) {
            Some(entry) => entry.state.lock().await.state,
            None => SessionState::Idle,
        }
    }

    pub async fn is_open(&self, connection_id: &str) -> bool {
        self.connection_state(connection_id).await == SessionState::Open
    }

    /// Connection ids with a session attempt in flight (anything but `idle`).
    pub async fn active_connection_ids(&self) -> Vec<String> {
        // Snapshot the map first; the per-entry locks are awaited outside
        // the shard guards.
        let entries: Vec<(String, Arc<SessionEntry>)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        let mut ids = Vec::new();
        for (id, entry) in entries {
            if entry.state.lock().await.state != SessionState::Idle {
                ids.push(id);
            }
        }
        ids
    }

    /// Send a text message over an open session.
    ///
    /// Fails with [`PalaverError::NotConnected`] when the session is not
    /// `open`; never retried here, reconnection is this supervisor's
    /// responsibility via its own schedule.
    pub async fn send(
        &self,
        connection_id: &str,
        address: &str,
        body: &str,
    ) -> Result<SentReceipt, PalaverError> {
        if !self.is_open(connection_id).await {
            return Err(PalaverError::NotConnected {
                connection_id: connection_id.to_string(),
            });
        }
        self.transport.send(connection_id, address, body).await
    }

    /// Wait for the next pairing/QR credential of a connecting session.
    ///
    /// Bounded by `timeout` (defaults to the configured pairing wait);
    /// resolves immediately when a code is already cached.
    pub async fn wait_for_pairing_code(
        &self,
        connection_id: &str,
        timeout: Option<Duration>,
    ) -> Result<String, PalaverError> {
        let entry = self
            .entry(connection_id)
            .ok_or_else(|| PalaverError::NotConnected {
                connection_id: connection_id.to_string(),
            })?;
        let timeout = timeout.unwrap_or(Duration::from_millis(self.config.pairing_wait_ms));
        let mut rx = entry.pairing.subscribe();
        let wait = async {
            loop {
                if let Some(code) = rx.borrow_and_update().clone() {
                    return Ok(code);
                }
                if rx.changed().await.is_err() {
                    return Err(PalaverError::NotConnected {
                        connection_id: connection_id.to_string(),
                    });
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| PalaverError::Timeout { duration: timeout })?
    }

    /// Open a transport session and spawn its event pump.
    ///
    /// Caller holds the entry lock.
    async fn spawn_session(
        self: &Arc<Self>,
        connection_id: &str,
        state: &mut EntryState,
    ) -> Result<(), PalaverError> {
        let rx = self.transport.start_session(connection_id).await?;

        state.generation += 1;
        let generation = state.generation;
        state.state = SessionState::Connecting;
        state.connecting_since = Some(Instant::now());
        if let Some(timer) = state.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(old) = state.pump.take() {
            old.abort();
        }

        let supervisor = Arc::clone(self);
        let id = connection_id.to_string();
        state.pump = Some(tokio::spawn(async move {
            supervisor.pump_events(id, generation, rx).await;
        }));
        Ok(())
    }

    /// Drain a session's event stream until it closes.
    async fn pump_events(
        self: Arc<Self>,
        connection_id: String,
        generation: u64,
        mut rx: mpsc::Receiver<TransportEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            match event {
                TransportEvent::PairingCode { code, .. } => {
                    self.on_pairing_code(&connection_id, generation, code).await;
                }
                TransportEvent::StateChange {
                    state: TransportState::Open,
                    ..
                } => {
                    self.on_open(&connection_id, generation).await;
                }
                TransportEvent::StateChange {
                    state: TransportState::Closed { reason },
                    ..
                } => {
                    self.on_closed(&connection_id, generation, reason).await;
                    return;
                }
                forwarded => {
                    if self.events.send(forwarded).await.is_err() {
                        warn!(
                            connection_id = %connection_id,
                            "event sink closed, stopping session pump"
                        );
                        return;
                    }
                }
            }
        }
        // Stream ended without an explicit close event; treat as a
        // retryable disconnect.
        self.on_closed(
            &connection_id,
            generation,
            DisconnectReason::Other("event stream ended".to_string()),
        )
        .await;
    }

    async fn on_pairing_code(&self, connection_id: &str, generation: u64, code: String) {
        let Some(entry) = self.entry(connection_id) else {
            return;
        };
        let state = entry.state.lock().await;
        if state.generation != generation || state.state != SessionState::Connecting {
            return;
        }
        info!(connection_id = %connection_id, "pairing code received");
        let _ = entry.pairing.send_replace(Some(code.clone()));
        let tenant = state.tenant_id.clone();
        let retry_count = state.retry_count;
        drop(state);

        self.report_state(
            tenant.as_deref(),
            connection_id,
            ConnectionStatus::Connecting,
            Some(&code),
            retry_count,
        )
        .await;
    }

    async fn on_open(&self, connection_id: &str, generation: u64) {
        let Some(entry) = self.entry(connection_id) else {
            return;
        };
        let mut state = entry.state.lock().await;
        if state.generation != generation {
            return;
        }
        state.state = SessionState::Open;
        state.connecting_since = None;
        state.retry_count = 0;
        if let Some(timer) = state.reconnect_timer.take() {
            timer.abort();
        }
        let _ = entry.pairing.send_replace(None);
        let tenant = state.tenant_id.clone();
        drop(state);

        info!(connection_id = %connection_id, "session open");
        self.report_state(
            tenant.as_deref(),
            connection_id,
            ConnectionStatus::Connected,
            None,
            0,
        )
        .await;
    }

    async fn on_closed(
        self: &Arc<Self>,
        connection_id: &str,
        generation: u64,
        reason: DisconnectReason,
    ) {
        let Some(entry) = self.entry(connection_id) else {
            return;
        };
        let mut state = entry.state.lock().await;
        if state.generation != generation {
            return;
        }
        let _ = entry.pairing.send_replace(None);
        state.pump = None;
        state.connecting_since = None;

        match reason {
            DisconnectReason::LoggedOut => {
                info!(connection_id = %connection_id, "session logged out, not retrying");
                state.state = SessionState::Idle;
                state.retry_count = 0;
                let tenant = state.tenant_id.clone();
                drop(state);
                self.report_state(
                    tenant.as_deref(),
                    connection_id,
                    ConnectionStatus::Disconnected,
                    None,
                    0,
                )
                .await;
            }
            DisconnectReason::Other(detail) => {
                warn!(connection_id = %connection_id, reason = %detail, "session closed");
                self.schedule_or_fail(connection_id, &mut state).await;
            }
        }
    }

    /// Increment the retry counter and either schedule the next attempt or
    /// give up. Caller holds the entry lock.
    ///
    /// Boxed because the scheduled timer ends in `try_reconnect`, which calls
    /// back into this function; the recursion needs an explicit indirection.
    fn schedule_or_fail<'a>(
        self: &'a Arc<Self>,
        connection_id: &'a str,
        state: &'a mut EntryState,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            state.retry_count += 1;
            let attempt = state.retry_count;
            let tenant = state.tenant_id.clone();

            if attempt > self.config.max_reconnect_attempts {
                let retries = attempt - 1;
                warn!(
                    connection_id = %connection_id,
                    retries,
                    "reconnect attempts exhausted, giving up"
                );
                state.state = SessionState::Idle;
                state.retry_count = 0;
                self.report_state(
                    tenant.as_deref(),
                    connection_id,
                    ConnectionStatus::Error,
                    None,
                    0,
                )
                .await;
                if let Some(tenant) = tenant.as_deref() {
                    let payload = serde_json::json!({
                        "id": connection_id,
                        "retries": retries,
                    });
                    if let Err(e) =
                        self.publisher.publish(tenant, "connection.failure", payload).await
                    {
                        warn!(connection_id = %connection_id, error = %e, "realtime publish failed");
                    }
                }
                return;
            }

            let delay = reconnect_delay(
                attempt,
                Duration::from_millis(self.config.reconnect_base_ms),
                Duration::from_millis(self.config.reconnect_cap_ms),
            );
            info!(
                connection_id = %connection_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect"
            );
            state.state = SessionState::Reconnecting;
            let generation = state.generation;
            let supervisor = Arc::clone(self);
            let id = connection_id.to_string();
            state.reconnect_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                supervisor.try_reconnect(&id, generation).await;
            }));
            self.report_state(
                tenant.as_deref(),
                connection_id,
                ConnectionStatus::Connecting,
                None,
                attempt,
            )
            .await;
        })
    }

    async fn try_reconnect(self: &Arc<Self>, connection_id: &str, generation: u64) {
        let Some(entry) = self.entry(connection_id) else {
            return;
        };
        let mut state = entry.state.lock().await;
        if state.generation != generation || state.state != SessionState::Reconnecting {
            // Cancelled by an explicit start/stop in the meantime.
            return;
        }
        state.reconnect_timer = None;
        info!(
            connection_id = %connection_id,
            attempt = state.retry_count,
            "reconnecting"
        );
        if let Err(e) = self.spawn_session(connection_id, &mut state).await {
            warn!(connection_id = %connection_id, error = %e, "reconnect attempt failed");
            self.schedule_or_fail(connection_id, &mut state).await;
        }
    }

    /// Mirror the connection row and publish `connection.update`.
    ///
    /// Both are best-effort; a storage or publish failure is logged and
    /// never blocks the owning transition.
    async fn report_state(
        &self,
        tenant: Option<&str>,
        connection_id: &str,
        status: ConnectionStatus,
        pairing_code: Option<&str>,
        retry_count: u32,
    ) {
        if let Err(e) = self
            .store
            .update_connection_state(connection_id, status, pairing_code, retry_count)
            .await
        {
            warn!(connection_id = %connection_id, error = %e, "failed to persist connection state");
        }
        if let Some(tenant) = tenant {
            let payload = serde_json::json!({
                "id": connection_id,
                "status": status.to_string(),
                "pairing_code": pairing_code,
                "retry_count": retry_count,
            });
            if let Err(e) = self.publisher.publish(tenant, "connection.update", payload).await {
                warn!(connection_id = %connection_id, error = %e, "realtime publish failed");
            }
        }
    }
}
