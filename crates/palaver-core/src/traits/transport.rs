// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport contract for the underlying messaging-network client.
//!
//! The wire protocol (handshake, encryption, framing) is entirely the
//! transport's concern; the engine only consumes its event stream and its
//! send/logout primitives.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::PalaverError;
use crate::types::{SentReceipt, TransportEvent};

/// The messaging-network client, treated as a black box.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Initiate a session for a connection id.
    ///
    /// Returns the event stream for that session: pairing codes, state
    /// changes, inbound messages, and delivery-status updates. The stream
    /// ends when the session is torn down.
    async fn start_session(
        &self,
        connection_id: &str,
    ) -> Result<mpsc::Receiver<TransportEvent>, PalaverError>;

    /// Send a text message to an address over an open session.
    async fn send(
        &self,
        connection_id: &str,
        address: &str,
        body: &str,
    ) -> Result<SentReceipt, PalaverError>;

    /// Best-effort graceful teardown of the session for a connection id.
    async fn logout(&self, connection_id: &str) -> Result<(), PalaverError>;
}
