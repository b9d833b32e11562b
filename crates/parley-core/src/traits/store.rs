// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message store collaborator trait.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::types::{ChatMessage, MessageId, NewMessage, RoomId};

/// Durable store for chat messages.
///
/// The store assigns the authoritative message id and timestamp at
/// persistence time. Deletion is a soft flag; history always returns
/// soft-deleted records so clients can render tombstones.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persisted history for a room, ordered by `(created_at, id)`.
    async fn history(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, ParleyError>;

    /// Persists a new message and returns it with the store-assigned id.
    async fn create_message(&self, new: &NewMessage) -> Result<ChatMessage, ParleyError>;

    /// Soft-deletes a message. The record is flagged, never removed.
    async fn delete_message(&self, id: &MessageId) -> Result<(), ParleyError>;

    /// Appends an emoji reaction and returns the updated message.
    async fn react(&self, id: &MessageId, emoji: &str) -> Result<ChatMessage, ParleyError>;
}
