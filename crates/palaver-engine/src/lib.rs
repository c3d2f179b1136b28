// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound orchestration and automated responses for Palaver.
//!
//! The [`Engine`] facade wires the session supervisor to the inbound
//! pipeline: status reconciliation (`sent < delivered < read`, monotonic),
//! one-shot greeting broadcasts, and prioritized bot-flow replies. Events
//! for one connection process in arrival order; different connections run
//! fully in parallel.

pub mod engine;
pub mod flow;
pub mod orchestrator;
mod resolve;
pub mod schedule;
pub mod status;

pub use engine::Engine;
pub use flow::{FlowMatch, FlowMatcher};
pub use orchestrator::InboundOrchestrator;
pub use schedule::{ScheduleMatcher, BROADCAST_MARKER};
pub use status::StatusReconciler;
