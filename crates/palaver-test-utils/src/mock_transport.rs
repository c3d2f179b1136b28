// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport for deterministic testing.
//!
//! `MockTransport` implements `Transport` with scripted per-connection event
//! sequences and captured outbound sends for assertion in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use palaver_core::types::{SentReceipt, TransportEvent};
use palaver_core::{PalaverError, Transport};

/// An outbound message captured by [`MockTransport::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedSend {
    pub connection_id: String,
    pub address: String,
    pub body: String,
}

/// A mock messaging transport for testing.
///
/// Events scripted via `script_event()` are delivered on the receiver
/// returned by the next `start_session()` for that connection; further
/// events can be pushed into a live session with `push_event()`. All
/// `send()` calls are captured for assertions.
pub struct MockTransport {
    scripted: Mutex<HashMap<String, Vec<TransportEvent>>>,
    live: Mutex<HashMap<String, mpsc::Sender<TransportEvent>>>,
    sent: Mutex<Vec<CapturedSend>>,
    start_count: AtomicUsize,
    logout_count: AtomicUsize,
    fail_sends: AtomicBool,
}

impl MockTransport {
    /// Create a new mock transport with no scripted events.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scripted: Mutex::new(HashMap::new()),
            live: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            start_count: AtomicUsize::new(0),
            logout_count: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
        })
    }

    /// Queue an event for delivery when the connection's session starts.
    ///
    /// Scripted events are drained in order on the next `start_session()`
    /// call for the event's connection.
    pub async fn script_event(&self, event: TransportEvent) {
        self.scripted
            .lock()
            .await
            .entry(event.connection_id().to_string())
            .or_default()
            .push(event);
    }

    /// Push an event into an already started session.
    pub async fn push_event(&self, event: TransportEvent) -> Result<(), PalaverError> {
        let tx = {
            let live = self.live.lock().await;
            live.get(event.connection_id()).cloned()
        };
        let tx = tx.ok_or_else(|| PalaverError::NotConnected {
            connection_id: event.connection_id().to_string(),
        })?;
        tx.send(event).await.map_err(|_| PalaverError::Transport {
            message: "mock event receiver dropped".to_string(),
            source: None,
        })
    }

    /// Drop the event sender for a connection, closing its receiver.
    ///
    /// Simulates the transport tearing down the stream without a state
    /// change event.
    pub async fn close_session(&self, connection_id: &str) {
        self.live.lock().await.remove(connection_id);
    }

    /// All messages captured by `send()`, in call order.
    pub async fn sent_messages(&self) -> Vec<CapturedSend> {
        self.sent.lock().await.clone()
    }

    /// Number of messages captured by `send()`.
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Number of times `start_session()` was called.
    pub fn start_count(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }

    /// Number of times `logout()` was called.
    pub fn logout_count(&self) -> usize {
        self.logout_count.load(Ordering::SeqCst)
    }

    /// Make every subsequent `send()` fail with a transport error.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Whether a session is currently live for the connection.
    pub async fn has_session(&self, connection_id: &str) -> bool {
        self.live.lock().await.contains_key(connection_id)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start_session(
        &self,
        connection_id: &str,
    ) -> Result<mpsc::Receiver<TransportEvent>, PalaverError> {
        self.start_count.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(64);
        let scripted = self
            .scripted
            .lock()
            .await
            .remove(connection_id)
            .unwrap_or_default();
        for event in scripted {
            tx.send(event).await.map_err(|_| PalaverError::Transport {
                message: "mock event receiver dropped".to_string(),
                source: None,
            })?;
        }
        self.live
            .lock()
            .await
            .insert(connection_id.to_string(), tx);
        Ok(rx)
    }

    async fn send(
        &self,
        connection_id: &str,
        address: &str,
        body: &str,
    ) -> Result<SentReceipt, PalaverError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(PalaverError::Transport {
                message: "mock send failure".to_string(),
                source: None,
            });
        }
        self.sent.lock().await.push(CapturedSend {
            connection_id: connection_id.to_string(),
            address: address.to_string(),
            body: body.to_string(),
        });
        Ok(SentReceipt {
            id: format!("mock-msg-{}", uuid::Uuid::new_v4()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }

    async fn logout(&self, connection_id: &str) -> Result<(), PalaverError> {
        self.logout_count.fetch_add(1, Ordering::SeqCst);
        self.live.lock().await.remove(connection_id);
        Ok(())
    }
}
