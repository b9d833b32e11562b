// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The relay wire protocol.
//!
//! Every frame on the realtime relay is one JSON-encoded [`RelayEvent`].
//! The closed tagged enum replaces dispatch over raw `"type"` strings so
//! consumers can match exhaustively.
//!
//! Client -> Relay (JSON):
//! ```json
//! {"type": "join_room", "room_id": "u1_u2", "participant_id": "u1"}
//! {"type": "message", "message": {"id": "m-1", ...}}
//! {"type": "offer", "room_id": "u1_u2", "description": {"kind": "offer", "sdp": "..."}}
//! {"type": "ping"}
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, IceCandidate, ParticipantId, RoomId, SessionDescription};

/// A single event exchanged with the realtime relay, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// Announce (or re-announce) membership in a room. Idempotent.
    JoinRoom {
        room_id: RoomId,
        participant_id: ParticipantId,
    },
    /// A persisted chat message broadcast to the room.
    Message { message: ChatMessage },
    /// Caller's session description.
    Offer {
        room_id: RoomId,
        description: SessionDescription,
    },
    /// Callee's session description.
    Answer {
        room_id: RoomId,
        description: SessionDescription,
    },
    /// A network path proposal for the in-progress call.
    IceCandidate {
        room_id: RoomId,
        candidate: IceCandidate,
    },
    /// Remote participant started or stopped typing.
    Typing {
        room_id: RoomId,
        participant_id: ParticipantId,
        is_typing: bool,
    },
    /// Either side terminated the call.
    Hangup { room_id: RoomId },
    /// Heartbeat probe.
    Ping,
    /// Heartbeat acknowledgment.
    Pong,
}

impl RelayEvent {
    /// The room this event belongs to, if it is room-scoped.
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            RelayEvent::JoinRoom { room_id, .. }
            | RelayEvent::Offer { room_id, .. }
            | RelayEvent::Answer { room_id, .. }
            | RelayEvent::IceCandidate { room_id, .. }
            | RelayEvent::Typing { room_id, .. }
            | RelayEvent::Hangup { room_id } => Some(room_id),
            RelayEvent::Message { message } => Some(&message.room_id),
            RelayEvent::Ping | RelayEvent::Pong => None,
        }
    }
}
