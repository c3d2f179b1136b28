// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Palaver messaging engine.
//!
//! This crate provides the foundational trait definitions, error type, and
//! domain types used throughout the Palaver workspace. The session
//! supervisor and response engine consume their collaborators (persistence,
//! transport, real-time fan-out) exclusively through the traits defined
//! here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::PalaverError;
pub use traits::{RealtimePublisher, Store, Transport};
pub use types::{
    ConnectionStatus, Direction, MessageStatus, TransportEvent, TransportState,
};
