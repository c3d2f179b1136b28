// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test doubles for the Palaver workspace.
//!
//! `MockTransport` stands in for the messaging-network client with scripted
//! event streams; `MemoryPublisher` records realtime fan-out for assertions.

pub mod memory_publisher;
pub mod mock_transport;

pub use memory_publisher::{MemoryPublisher, PublishedEvent};
pub use mock_transport::{CapturedSend, MockTransport};
