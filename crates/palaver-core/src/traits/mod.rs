// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits at the engine's seams.
//!
//! The engine core never talks to SQLite, the wire protocol, or the
//! real-time fan-out directly; it goes through these traits.

pub mod publish;
pub mod store;
pub mod transport;

pub use publish::RealtimePublisher;
pub use store::Store;
pub use transport::Transport;
