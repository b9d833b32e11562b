// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory message store for testing.
//!
//! Mirrors the contract of the durable store: ids and timestamps are
//! assigned at persistence time, deletion is a soft flag, and history comes
//! back ordered by `(created_at, id)`. A one-shot failure can be armed to
//! exercise rollback paths.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parley_core::types::{ChatMessage, MessageId, NewMessage, RoomId};
use parley_core::{MessageStore, ParleyError};
use tokio::sync::Mutex;

/// A message store backed by a `Vec`, for tests.
pub struct InMemoryMessageStore {
    messages: Mutex<Vec<ChatMessage>>,
    next_id: AtomicU64,
    fail_next: Mutex<Option<String>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fail_next: Mutex::new(None),
        }
    }

    /// Arm a one-shot failure: the next store operation fails with a
    /// persistence error carrying `message`.
    pub async fn fail_next(&self, message: &str) {
        *self.fail_next.lock().await = Some(message.to_string());
    }

    /// Seed a message directly, bypassing id assignment.
    pub async fn seed(&self, message: ChatMessage) {
        self.messages.lock().await.push(message);
    }

    /// Number of stored messages, including soft-deleted ones.
    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }

    async fn take_armed_failure(&self) -> Result<(), ParleyError> {
        if let Some(message) = self.fail_next.lock().await.take() {
            return Err(ParleyError::persistence(message));
        }
        Ok(())
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn history(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, ParleyError> {
        self.take_armed_failure().await?;
        let mut history: Vec<ChatMessage> = self
            .messages
            .lock()
            .await
            .iter()
            .filter(|m| &m.room_id == room_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| {
            (a.created_at.as_str(), &a.id).cmp(&(b.created_at.as_str(), &b.id))
        });
        Ok(history)
    }

    async fn create_message(&self, new: &NewMessage) -> Result<ChatMessage, ParleyError> {
        self.take_armed_failure().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = ChatMessage {
            id: MessageId(format!("m-{id}")),
            room_id: new.room_id.clone(),
            sender: new.sender.clone(),
            content: new.content.clone(),
            kind: new.kind,
            quoted_message_id: new.quoted_message_id.clone(),
            reactions: Vec::new(),
            is_deleted: false,
            created_at: chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string(),
        };
        self.messages.lock().await.push(message.clone());
        Ok(message)
    }

    async fn delete_message(&self, id: &MessageId) -> Result<(), ParleyError> {
        self.take_armed_failure().await?;
        let mut messages = self.messages.lock().await;
        match messages.iter_mut().find(|m| &m.id == id) {
            Some(message) => {
                message.is_deleted = true;
                Ok(())
            }
            None => Err(ParleyError::persistence(format!("no such message: {id}"))),
        }
    }

    async fn react(&self, id: &MessageId, emoji: &str) -> Result<ChatMessage, ParleyError> {
        self.take_armed_failure().await?;
        let mut messages = self.messages.lock().await;
        match messages.iter_mut().find(|m| &m.id == id) {
            Some(message) => {
                message.reactions.push(emoji.to_string());
                Ok(message.clone())
            }
            None => Err(ParleyError::persistence(format!("no such message: {id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::{MessageKind, ParticipantId};

    fn new_message(room: &str, content: &str) -> NewMessage {
        NewMessage {
            room_id: RoomId(room.into()),
            sender: ParticipantId("u1".into()),
            content: content.into(),
            kind: MessageKind::Text,
            quoted_message_id: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let store = InMemoryMessageStore::new();
        let first = store.create_message(&new_message("r", "a")).await.unwrap();
        let second = store.create_message(&new_message("r", "b")).await.unwrap();
        assert_eq!(first.id.0, "m-1");
        assert_eq!(second.id.0, "m-2");
    }

    #[tokio::test]
    async fn delete_is_soft() {
        let store = InMemoryMessageStore::new();
        let msg = store.create_message(&new_message("r", "a")).await.unwrap();
        store.delete_message(&msg.id).await.unwrap();
        let history = store.history(&RoomId("r".into())).await.unwrap();
        assert_eq!(history.len(), 1, "record survives deletion");
        assert!(history[0].is_deleted);
    }

    #[tokio::test]
    async fn armed_failure_fires_once() {
        let store = InMemoryMessageStore::new();
        store.fail_next("store offline").await;
        assert!(store.create_message(&new_message("r", "a")).await.is_err());
        assert!(store.create_message(&new_message("r", "b")).await.is_ok());
    }

    #[tokio::test]
    async fn history_filters_by_room() {
        let store = InMemoryMessageStore::new();
        store.create_message(&new_message("r1", "a")).await.unwrap();
        store.create_message(&new_message("r2", "b")).await.unwrap();
        let history = store.history(&RoomId("r1".into())).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "a");
    }
}
