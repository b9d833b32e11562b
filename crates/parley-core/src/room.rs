// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical room id derivation.
//!
//! Both participants must address the same logical channel without a
//! handshake, so the derivation is a pure function of the two ids: sorted
//! lexicographically and joined with a fixed separator. An explicitly
//! supplied room id (pre-assigned booking flows, support rooms) is an
//! escape hatch returned unchanged.

use crate::types::{ParticipantId, RoomId};

/// Separator between the sorted participant ids in a derived room id.
pub const ROOM_ID_SEPARATOR: &str = "_";

/// Derive the canonical room id for a participant pair.
///
/// Pure and deterministic: both sides compute an identical value
/// independently, and repeated calls with the same inputs yield the same
/// id. Ids are trimmed before sorting so incidental whitespace from
/// upstream forms cannot split a pair across two rooms.
pub fn resolve_room_id(
    self_id: &ParticipantId,
    other_id: &ParticipantId,
    explicit: Option<&RoomId>,
) -> RoomId {
    if let Some(room_id) = explicit {
        return room_id.clone();
    }

    let a = self_id.0.trim();
    let b = other_id.0.trim();
    if a <= b {
        RoomId(format!("{a}{ROOM_ID_SEPARATOR}{b}"))
    } else {
        RoomId(format!("{b}{ROOM_ID_SEPARATOR}{a}"))
    }
}
