// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Palaver workspace.
//!
//! Entities mirror the CRM's relational model; enums that end up in storage
//! columns derive `strum` Display/FromStr with stable snake_case spellings.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status of a stored connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Declared type of a connection. Only `Session` connections drive a live
/// transport session; `Api` connections are request/response only.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Session,
    Api,
}

/// Direction of a stored message relative to the tenant's account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    FromMe,
}

/// Delivery status of a stored message.
///
/// `Sent`, `Delivered` and `Read` form a strict hierarchy that must never
/// regress. `Received` is the initial state of inbound messages and sits
/// below the hierarchy; `Failed` is terminal and exclusive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Received,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Position in the `sent < delivered < read` hierarchy, or `None` for
    /// statuses outside it.
    pub fn hierarchy_index(&self) -> Option<usize> {
        match self {
            MessageStatus::Sent => Some(0),
            MessageStatus::Delivered => Some(1),
            MessageStatus::Read => Some(2),
            MessageStatus::Received | MessageStatus::Failed => None,
        }
    }
}

/// Matcher type of a bot condition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    ExactMatch,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
    MenuOption,
}

/// Comparison operator applied by equality-style condition kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MatchOperator {
    Equals,
    NotEquals,
}

/// A tenant's configured chat endpoint, bound to at most one live transport
/// session at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub kind: ConnectionKind,
    pub status: ConnectionStatus,
    /// Last pairing/QR credential issued while connecting; cleared on open.
    pub pairing_code: Option<String>,
    pub retry_count: u32,
    pub created_at: String,
    pub updated_at: String,
}

/// A known remote party, unique per tenant by normalized address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub tenant_id: String,
    /// Normalized transport address (lower-cased, trimmed).
    pub address: String,
    pub name: Option<String>,
    pub created_at: String,
}

/// Groups messages for one contact+connection pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub tenant_id: String,
    pub contact_id: String,
    pub connection_id: String,
    pub unread_count: i64,
    pub last_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One chat message, inbound or outbound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Transport-assigned id when available, otherwise a generated one.
    pub id: String,
    pub tenant_id: String,
    pub connection_id: String,
    pub conversation_id: String,
    pub contact_id: String,
    pub direction: Direction,
    pub body: String,
    pub media_url: Option<String>,
    pub media_kind: Option<String>,
    pub status: MessageStatus,
    pub reaction: Option<String>,
    pub sent_at: Option<String>,
    pub delivered_at: Option<String>,
    pub read_at: Option<String>,
    pub created_at: String,
}

/// One `[from, to]` local-clock range, both bounds inclusive, `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: String,
    pub to: String,
}

/// Per-connection one-shot greeting broadcast configuration.
///
/// Read-only to the engine; owned and mutated by the CRUD layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoMessageSchedule {
    pub id: String,
    pub tenant_id: String,
    pub connection_id: String,
    pub body: String,
    pub active: bool,
    /// Weekdays the schedule applies to, 0 = Sunday .. 6 = Saturday.
    pub days_of_week: Vec<u8>,
    pub windows: Vec<TimeWindow>,
    pub created_at: String,
}

/// An ordered, prioritized automated-response program scoped to a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotFlow {
    pub id: String,
    pub tenant_id: String,
    pub connection_id: String,
    pub name: String,
    pub active: bool,
    /// Higher priority evaluates first; ties break by creation order.
    pub priority: i64,
    /// Bypass the single-shot interaction guard.
    pub always_respond: bool,
    /// Abort evaluation of remaining flows once this flow matches.
    pub stop_on_match: bool,
    pub created_at: String,
}

/// A single matcher within a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotCondition {
    pub id: String,
    pub flow_id: String,
    pub kind: ConditionKind,
    pub operator: MatchOperator,
    pub value: String,
    pub case_sensitive: bool,
    /// Optional regex flags (`i` for case-insensitive) for `Regex` conditions.
    pub regex_flags: Option<String>,
    /// Evaluation order within the flow.
    pub position: i64,
}

/// One reply payload attached to a condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotResponse {
    pub id: String,
    pub condition_id: String,
    pub body: String,
    pub media_url: Option<String>,
    /// Delay in milliseconds the orchestrator honors before sending.
    pub delay_ms: i64,
    /// Send order within the condition.
    pub position: i64,
}

/// Append-only audit record preventing duplicate automated replies to the
/// same inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotInteraction {
    pub id: String,
    pub tenant_id: String,
    pub connection_id: String,
    pub message_id: String,
    /// `None` when the full pass produced no match.
    pub flow_id: Option<String>,
    pub matched: bool,
    pub responses_sent: i64,
    pub created_at: String,
}

// --- Transport event types ---

/// Receipt returned by the transport for a sent message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentReceipt {
    pub id: String,
    pub timestamp: String,
}

/// Why a transport session closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Explicit logout; terminal, never retried.
    LoggedOut,
    /// Anything else (network drop, server restart); eligible for retry.
    Other(String),
}

/// Session-level state reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportState {
    Open,
    Closed { reason: DisconnectReason },
}

/// A reaction sub-event targeting a previously stored message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub target_message_id: String,
    pub emoji: String,
}

/// An inbound message event as delivered by the transport.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Transport-assigned message id.
    pub id: String,
    pub connection_id: String,
    pub sender_address: String,
    pub sender_name: Option<String>,
    pub body: Option<String>,
    pub media_url: Option<String>,
    pub media_kind: Option<String>,
    pub from_me: bool,
    pub group: bool,
    pub reaction: Option<Reaction>,
    pub timestamp: String,
}

/// An asynchronous delivery-status event from the transport.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub connection_id: String,
    pub message_id: String,
    /// Transport-native ack code; see [`crate::types::ack_to_status`].
    pub code: i64,
    /// Whether the referenced message originated from the tenant's own
    /// account (possibly from another client instance).
    pub from_me: bool,
    /// Chat address the status belongs to, when the transport provides it.
    pub chat_address: Option<String>,
    /// Echoed message content from the transport's local history, if cached.
    pub body: Option<String>,
}

/// Everything the transport can push for a connection.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    PairingCode { connection_id: String, code: String },
    StateChange { connection_id: String, state: TransportState },
    Inbound(InboundEvent),
    StatusUpdate(StatusEvent),
}

impl TransportEvent {
    /// The connection this event belongs to.
    pub fn connection_id(&self) -> &str {
        match self {
            TransportEvent::PairingCode { connection_id, .. }
            | TransportEvent::StateChange { connection_id, .. } => connection_id,
            TransportEvent::Inbound(ev) => &ev.connection_id,
            TransportEvent::StatusUpdate(ev) => &ev.connection_id,
        }
    }
}

/// Map a transport-native ack code onto the stored status hierarchy.
///
/// Codes follow the messaging network's convention: 0 error, 1 pending,
/// 2 server ack, 3 delivery ack, 4 read, 5 played. Pending and unknown
/// codes map to `None` and are ignored by the reconciler.
pub fn ack_to_status(code: i64) -> Option<MessageStatus> {
    match code {
        0 => Some(MessageStatus::Failed),
        2 => Some(MessageStatus::Sent),
        3 => Some(MessageStatus::Delivered),
        4 | 5 => Some(MessageStatus::Read),
        _ => None,
    }
}
