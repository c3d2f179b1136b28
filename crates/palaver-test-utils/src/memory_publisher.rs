// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory publisher capturing realtime events for assertions.

use async_trait::async_trait;
use tokio::sync::Mutex;

use palaver_core::{PalaverError, RealtimePublisher};

/// One event captured by [`MemoryPublisher::publish`].
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub tenant_room: String,
    pub event: String,
    pub payload: serde_json::Value,
}

/// A publisher that records every event instead of fanning it out.
#[derive(Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<PublishedEvent>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All published events, in publish order.
    pub async fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().await.clone()
    }

    /// Events with a matching `event` name.
    pub async fn events_named(&self, name: &str) -> Vec<PublishedEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.event == name)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait]
impl RealtimePublisher for MemoryPublisher {
    async fn publish(
        &self,
        tenant_room: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), PalaverError> {
        self.events.lock().await.push(PublishedEvent {
            tenant_room: tenant_room.to_string(),
            event: event.to_string(),
            payload,
        });
        Ok(())
    }
}
