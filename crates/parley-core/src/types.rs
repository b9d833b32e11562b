// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Parley workspace.
//!
//! Wire-facing shapes (`ChatMessage`, `SessionDescription`, `IceCandidate`)
//! must stay field-for-field consistent across client implementations: both
//! peers derive identical room ids and interpret identical event payloads.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Monetary amount in the ledger's minor unit.
///
/// Engine-visible amounts are never negative; the ledger collaborator is
/// the single source of truth for balances.
pub type Amount = i64;

/// Unique identifier for a participant, issued by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

/// Canonical identifier for the logical channel two participants share.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub String);

/// Unique identifier for a chat message. Assigned by the message store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Unique identifier for a consultation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which side of the consultation a participant is on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Client,
    Provider,
}

/// A participant in a consultation. Identity is stable for the session
/// lifetime and read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub role: Role,
}

/// Content kind of a chat message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Document,
}

/// A persisted chat message.
///
/// The `id` is authoritative once assigned by the message store. Deletion
/// is a soft flag: records are never physically removed (audit requirement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender: ParticipantId,
    pub content: String,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_message_id: Option<MessageId>,
    /// Emoji reactions in the order they were applied.
    #[serde(default)]
    pub reactions: Vec<String>,
    #[serde(default)]
    pub is_deleted: bool,
    /// ISO 8601 timestamp assigned at persistence time.
    pub created_at: String,
}

/// Payload for creating a message via the store. The store assigns the
/// authoritative id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub room_id: RoomId,
    pub sender: ParticipantId,
    pub content: String,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_message_id: Option<MessageId>,
}

/// Whether a consultation is text chat or an audio/video call.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConsultationKind {
    Chat,
    Call,
}

/// Lifecycle state of a consultation session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Active,
    Ended,
}

/// A metered consultation session as recorded by the ledger collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultationSession {
    pub id: SessionId,
    pub client_id: ParticipantId,
    pub provider_id: ParticipantId,
    pub kind: ConsultationKind,
    pub rate_per_minute: Amount,
    /// ISO 8601 timestamp of session start.
    pub started_at: String,
    pub status: SessionStatus,
    /// Balance provisionally held against this session. Always >= 0.
    pub reserved_balance: Amount,
    /// Ceiling of minutes the current reservation covers.
    pub elapsed_minutes: u32,
}

/// Result of settling an ended consultation against the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub session: ConsultationSession,
    /// Amount actually charged for elapsed time. Never exceeds the
    /// original reservation.
    pub charged: Amount,
    /// Unused reservation returned to the balance.
    pub refunded: Amount,
}

/// Kind of a WebRTC session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A WebRTC session description exchanged over the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

/// A network path proposal used during peer connection negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}
