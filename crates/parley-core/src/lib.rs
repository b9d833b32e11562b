// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley consultation engine.
//!
//! This crate provides the shared types, error taxonomy, relay wire
//! protocol, room id derivation, and collaborator traits used throughout
//! the Parley workspace.

pub mod error;
pub mod event;
pub mod room;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ParleyError;
pub use event::RelayEvent;
pub use room::resolve_room_id;
pub use types::{
    Amount, ChatMessage, ConsultationKind, ConsultationSession, MessageId, MessageKind,
    Participant, ParticipantId, Role, RoomId, SessionId, SessionStatus, Settlement,
};

// Re-export all collaborator traits at crate root.
pub use traits::{AuthProvider, ConsultationLedger, MessageStore, RelayTransport};
