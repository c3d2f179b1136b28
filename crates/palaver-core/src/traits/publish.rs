// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Real-time fan-out contract, keyed by tenant.

use async_trait::async_trait;

use crate::error::PalaverError;

/// Publishes engine events to a tenant's subscribed clients.
///
/// Implementations are expected to be cheap and non-blocking; publish
/// failures are logged by callers and never abort engine processing.
#[async_trait]
pub trait RealtimePublisher: Send + Sync + 'static {
    /// Publish `payload` under `event` to every subscriber of `tenant_room`.
    async fn publish(
        &self,
        tenant_room: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), PalaverError>;
}
