// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport session supervision for Palaver.
//!
//! [`SessionSupervisor`] owns one state machine per connection id:
//! establishment, pairing-code surfacing, bounded-retry reconnection with
//! exponential backoff, and forced teardown.

pub mod backoff;
pub mod supervisor;

pub use supervisor::{SessionState, SessionSupervisor};
