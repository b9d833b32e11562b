// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The chat-room message pipeline.
//!
//! Outgoing messages are persisted via the message store before anything is
//! broadcast or displayed as final: a tentative pending entry is promoted
//! to the store-confirmed message (with the authoritative id) on success,
//! or rolled back on failure. A message is never broadcast without being
//! durably stored first.
//!
//! Incoming live messages merge idempotently with fetched history,
//! de-duplicated by store id, so replaying history after a live delivery
//! (or vice versa) never produces duplicates. Display order is
//! `(created_at, id)`.

use std::collections::HashSet;
use std::sync::Arc;

use parley_connection::{ConnectionManager, ConnectionSignal};
use parley_core::types::{ChatMessage, MessageKind, NewMessage};
use parley_core::{MessageId, MessageStore, ParleyError, ParticipantId, RelayEvent, RoomId};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A locally-created message awaiting store confirmation.
///
/// The local id is a uuid placeholder; the store-assigned id replaces it
/// when the entry is promoted.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub local_id: MessageId,
    pub content: String,
    pub kind: MessageKind,
    pub quoted_message_id: Option<MessageId>,
}

#[derive(Default)]
struct RoomState {
    /// Confirmed messages in `(created_at, id)` order.
    messages: Vec<ChatMessage>,
    /// Ids already merged, for echo suppression and idempotent history
    /// application.
    seen: HashSet<MessageId>,
    /// Tentative entries not yet confirmed by the store.
    pending: Vec<PendingMessage>,
    /// Whether the remote participant is currently typing.
    remote_typing: bool,
}

/// Message pipeline for one room.
pub struct ChatPipeline {
    room_id: RoomId,
    self_id: ParticipantId,
    store: Arc<dyn MessageStore>,
    connection: Arc<ConnectionManager>,
    state: Mutex<RoomState>,
}

impl ChatPipeline {
    pub fn new(
        room_id: RoomId,
        self_id: ParticipantId,
        store: Arc<dyn MessageStore>,
        connection: Arc<ConnectionManager>,
    ) -> Self {
        Self {
            room_id,
            self_id,
            store,
            connection,
            state: Mutex::new(RoomState::default()),
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Announce room membership and load history.
    ///
    /// History application is idempotent: live messages buffered before the
    /// fetch completes are not duplicated.
    pub async fn join(&self) -> Result<(), ParleyError> {
        self.connection.join_room(self.room_id.clone()).await?;
        self.refresh().await
    }

    /// Re-fetch history and merge it into local state. Called on join and
    /// after every reconnect to reconcile messages missed while offline.
    pub async fn refresh(&self) -> Result<(), ParleyError> {
        let history = self.store.history(&self.room_id).await?;
        let mut state = self.state.lock().await;
        let merged = history.len();
        for message in history {
            merge_message(&mut state, message);
        }
        debug!(room_id = %self.room_id, count = merged, "history merged");
        Ok(())
    }

    /// Persist and broadcast a message.
    ///
    /// The store write happens first and assigns the authoritative id; on
    /// store failure the tentative entry is rolled back, nothing is
    /// broadcast, and the error is surfaced. A broadcast failure after a
    /// successful write is non-fatal: the message is durable and the remote
    /// side reconciles it via history refresh on its next (re)join.
    pub async fn send_message(
        &self,
        content: &str,
        kind: MessageKind,
        quoted_message_id: Option<MessageId>,
    ) -> Result<ChatMessage, ParleyError> {
        if content.trim().is_empty() {
            return Err(ParleyError::Validation("message content is empty".into()));
        }

        let local_id = MessageId(uuid::Uuid::new_v4().to_string());
        {
            let mut state = self.state.lock().await;
            state.pending.push(PendingMessage {
                local_id: local_id.clone(),
                content: content.to_string(),
                kind,
                quoted_message_id: quoted_message_id.clone(),
            });
        }

        let new = NewMessage {
            room_id: self.room_id.clone(),
            sender: self.self_id.clone(),
            content: content.to_string(),
            kind,
            quoted_message_id,
        };
        let confirmed = match self.store.create_message(&new).await {
            Ok(message) => message,
            Err(err) => {
                // Roll back the tentative entry; the send failed as a whole.
                let mut state = self.state.lock().await;
                state.pending.retain(|p| p.local_id != local_id);
                return Err(err);
            }
        };

        {
            let mut state = self.state.lock().await;
            state.pending.retain(|p| p.local_id != local_id);
            merge_message(&mut state, confirmed.clone());
        }

        if let Err(err) = self
            .connection
            .send(RelayEvent::Message {
                message: confirmed.clone(),
            })
            .await
        {
            warn!(message_id = %confirmed.id, error = %err,
                "broadcast failed after persist, peer will catch up via history");
        }

        Ok(confirmed)
    }

    /// Soft-delete a message. Local state changes only after the store
    /// confirms.
    pub async fn delete_message(&self, id: &MessageId) -> Result<(), ParleyError> {
        self.store.delete_message(id).await?;
        let mut state = self.state.lock().await;
        if let Some(message) = state.messages.iter_mut().find(|m| &m.id == id) {
            message.is_deleted = true;
        }
        Ok(())
    }

    /// Append an emoji reaction. Local state changes only after the store
    /// confirms, taking the store's returned copy as authoritative.
    pub async fn react(&self, id: &MessageId, emoji: &str) -> Result<ChatMessage, ParleyError> {
        let updated = self.store.react(id, emoji).await?;
        let mut state = self.state.lock().await;
        if let Some(message) = state.messages.iter_mut().find(|m| &m.id == id) {
            *message = updated.clone();
        }
        Ok(updated)
    }

    /// Emit a typing notice for this room.
    pub async fn set_typing(&self, is_typing: bool) -> Result<(), ParleyError> {
        self.connection
            .send(RelayEvent::Typing {
                room_id: self.room_id.clone(),
                participant_id: self.self_id.clone(),
                is_typing,
            })
            .await
    }

    /// Whether the remote participant is currently typing.
    pub async fn remote_typing(&self) -> bool {
        self.state.lock().await.remote_typing
    }

    /// Snapshot of confirmed messages in display order.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().await.messages.clone()
    }

    /// Snapshot of tentative entries awaiting store confirmation.
    pub async fn pending(&self) -> Vec<PendingMessage> {
        self.state.lock().await.pending.clone()
    }

    /// Apply one inbound relay event to local state.
    ///
    /// Echoes of own previously-sent messages (matched by id) are ignored;
    /// events for other rooms are ignored.
    pub async fn apply_event(&self, event: &RelayEvent) {
        match event {
            RelayEvent::Message { message } if message.room_id == self.room_id => {
                let mut state = self.state.lock().await;
                if state.seen.contains(&message.id) {
                    debug!(message_id = %message.id, "duplicate delivery ignored");
                    return;
                }
                merge_message(&mut state, message.clone());
            }
            RelayEvent::Typing {
                room_id,
                participant_id,
                is_typing,
            } if room_id == &self.room_id && participant_id != &self.self_id => {
                self.state.lock().await.remote_typing = *is_typing;
            }
            _ => {}
        }
    }

    /// Apply one connection signal: events merge into local state and a
    /// reconnect triggers a history refresh.
    pub async fn handle_signal(&self, signal: &ConnectionSignal) {
        match signal {
            ConnectionSignal::Event(event) => self.apply_event(event).await,
            ConnectionSignal::Reconnected => {
                if let Err(err) = self.refresh().await {
                    warn!(room_id = %self.room_id, error = %err,
                        "history refresh after reconnect failed");
                }
            }
        }
    }

    /// Spawn a task feeding connection signals into this pipeline until the
    /// connection manager closes.
    pub fn spawn_listener(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pipeline = Arc::clone(self);
        let mut rx = pipeline.connection.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(signal) => pipeline.handle_signal(&signal).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "event subscriber lagged, refreshing history");
                        if let Err(err) = pipeline.refresh().await {
                            warn!(error = %err, "lag recovery refresh failed");
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                }
            }
        })
    }
}

/// Insert or update a message, keeping `(created_at, id)` order.
///
/// The store's copy is authoritative: a merge of an already-seen id
/// replaces the local copy (reactions and deletion flags may have moved
/// on since the live delivery).
fn merge_message(state: &mut RoomState, message: ChatMessage) {
    if state.seen.contains(&message.id) {
        if let Some(existing) = state.messages.iter_mut().find(|m| m.id == message.id) {
            *existing = message;
        }
        return;
    }
    let key = (message.created_at.clone(), message.id.clone());
    let index = state
        .messages
        .partition_point(|m| (m.created_at.as_str(), &m.id) <= (key.0.as_str(), &key.1));
    state.seen.insert(message.id.clone());
    state.messages.insert(index, message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_config::model::{HeartbeatConfig, ReconnectConfig};
    use parley_core::traits::auth::Credentials;
    use parley_test_utils::{InMemoryMessageStore, MockRelay, MockRelayHandle};

    fn pid(s: &str) -> ParticipantId {
        ParticipantId(s.into())
    }

    async fn setup() -> (Arc<ChatPipeline>, Arc<InMemoryMessageStore>, MockRelayHandle) {
        let relay = MockRelay::new();
        let handle = relay.handle();
        let connection = ConnectionManager::connect(
            Box::new(relay),
            Credentials {
                participant_id: pid("u1"),
                token: "tok".into(),
            },
            &ReconnectConfig {
                base_delay_ms: 1,
                multiplier: 2.0,
                max_delay_ms: 10,
                jitter: 0.0,
                max_attempts: Some(3),
            },
            &HeartbeatConfig {
                interval_secs: 60,
                timeout_secs: 120,
            },
        )
        .await
        .unwrap();

        let store = Arc::new(InMemoryMessageStore::new());
        let pipeline = Arc::new(ChatPipeline::new(
            RoomId("u1_u2".into()),
            pid("u1"),
            store.clone() as Arc<dyn MessageStore>,
            Arc::new(connection),
        ));
        (pipeline, store, handle)
    }

    fn remote_message(id: &str, content: &str, created_at: &str) -> ChatMessage {
        ChatMessage {
            id: MessageId(id.into()),
            room_id: RoomId("u1_u2".into()),
            sender: pid("u2"),
            content: content.into(),
            kind: MessageKind::Text,
            quoted_message_id: None,
            reactions: Vec::new(),
            is_deleted: false,
            created_at: created_at.into(),
        }
    }

    #[tokio::test]
    async fn send_persists_then_broadcasts() {
        let (pipeline, store, handle) = setup().await;
        pipeline.join().await.unwrap();

        let confirmed = pipeline
            .send_message("hello", MessageKind::Text, None)
            .await
            .unwrap();

        assert_eq!(confirmed.id.0, "m-1", "store assigns the id");
        assert_eq!(store.len().await, 1);
        let broadcasts: Vec<_> = handle
            .sent_events()
            .await
            .into_iter()
            .filter(|e| matches!(e, RelayEvent::Message { .. }))
            .collect();
        assert_eq!(broadcasts.len(), 1);
        assert!(pipeline.pending().await.is_empty());
        assert_eq!(pipeline.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn persistence_failure_rolls_back_and_broadcasts_nothing() {
        let (pipeline, store, handle) = setup().await;
        pipeline.join().await.unwrap();
        store.fail_next("store offline").await;

        let result = pipeline.send_message("hello", MessageKind::Text, None).await;

        assert!(matches!(result, Err(ParleyError::Persistence { .. })));
        assert!(pipeline.pending().await.is_empty(), "tentative entry rolled back");
        assert!(pipeline.messages().await.is_empty());
        assert!(
            !handle
                .sent_events()
                .await
                .iter()
                .any(|e| matches!(e, RelayEvent::Message { .. })),
            "nothing broadcast without durable storage"
        );
    }

    #[tokio::test]
    async fn empty_content_rejected_before_any_call() {
        let (pipeline, store, _handle) = setup().await;
        let result = pipeline.send_message("   ", MessageKind::Text, None).await;
        assert!(matches!(result, Err(ParleyError::Validation(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn history_after_live_delivery_does_not_duplicate() {
        let (pipeline, store, _handle) = setup().await;

        let msg = remote_message("m-9", "early", "2026-03-01T10:00:00.000Z");
        store.seed(msg.clone()).await;

        // Live delivery lands first.
        pipeline
            .apply_event(&RelayEvent::Message {
                message: msg.clone(),
            })
            .await;
        assert_eq!(pipeline.messages().await.len(), 1);

        // History replay of the same id is idempotent.
        pipeline.join().await.unwrap();
        assert_eq!(pipeline.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn own_echo_is_ignored() {
        let (pipeline, _store, _handle) = setup().await;
        pipeline.join().await.unwrap();
        let confirmed = pipeline
            .send_message("hello", MessageKind::Text, None)
            .await
            .unwrap();

        // The relay echoes our own broadcast back.
        pipeline
            .apply_event(&RelayEvent::Message {
                message: confirmed.clone(),
            })
            .await;
        assert_eq!(pipeline.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn messages_ordered_by_timestamp_then_id() {
        let (pipeline, _store, _handle) = setup().await;

        pipeline
            .apply_event(&RelayEvent::Message {
                message: remote_message("m-2", "b", "2026-03-01T10:00:05.000Z"),
            })
            .await;
        pipeline
            .apply_event(&RelayEvent::Message {
                message: remote_message("m-1", "a", "2026-03-01T10:00:00.000Z"),
            })
            .await;
        pipeline
            .apply_event(&RelayEvent::Message {
                // Same timestamp as m-2: store id order breaks the tie.
                message: remote_message("m-3", "c", "2026-03-01T10:00:05.000Z"),
            })
            .await;

        let contents: Vec<_> = pipeline
            .messages()
            .await
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn other_room_events_are_ignored() {
        let (pipeline, _store, _handle) = setup().await;
        let mut foreign = remote_message("m-7", "elsewhere", "2026-03-01T10:00:00.000Z");
        foreign.room_id = RoomId("u3_u4".into());
        pipeline
            .apply_event(&RelayEvent::Message { message: foreign })
            .await;
        assert!(pipeline.messages().await.is_empty());
    }

    #[tokio::test]
    async fn delete_failure_leaves_local_state_unchanged() {
        let (pipeline, store, _handle) = setup().await;
        pipeline.join().await.unwrap();
        let confirmed = pipeline
            .send_message("hello", MessageKind::Text, None)
            .await
            .unwrap();

        store.fail_next("store offline").await;
        assert!(pipeline.delete_message(&confirmed.id).await.is_err());
        assert!(!pipeline.messages().await[0].is_deleted);

        // Retry succeeds and the local flag follows the store.
        pipeline.delete_message(&confirmed.id).await.unwrap();
        assert!(pipeline.messages().await[0].is_deleted);
    }

    #[tokio::test]
    async fn react_updates_local_copy_on_success_only() {
        let (pipeline, store, _handle) = setup().await;
        pipeline.join().await.unwrap();
        let confirmed = pipeline
            .send_message("hello", MessageKind::Text, None)
            .await
            .unwrap();

        store.fail_next("store offline").await;
        assert!(pipeline.react(&confirmed.id, "\u{1F44D}").await.is_err());
        assert!(pipeline.messages().await[0].reactions.is_empty());

        pipeline.react(&confirmed.id, "\u{1F44D}").await.unwrap();
        assert_eq!(pipeline.messages().await[0].reactions, vec!["\u{1F44D}"]);
    }

    #[tokio::test]
    async fn reconnect_signal_refreshes_history() {
        let (pipeline, store, _handle) = setup().await;
        pipeline.join().await.unwrap();

        // A message persisted while we were offline.
        store
            .seed(remote_message("m-5", "missed you", "2026-03-01T10:00:00.000Z"))
            .await;
        assert!(pipeline.messages().await.is_empty());

        pipeline
            .handle_signal(&ConnectionSignal::Reconnected)
            .await;
        assert_eq!(pipeline.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn typing_notice_from_remote_tracked() {
        let (pipeline, _store, _handle) = setup().await;
        pipeline
            .apply_event(&RelayEvent::Typing {
                room_id: RoomId("u1_u2".into()),
                participant_id: pid("u2"),
                is_typing: true,
            })
            .await;
        assert!(pipeline.remote_typing().await);

        // Own typing echo does not flip the remote flag.
        pipeline
            .apply_event(&RelayEvent::Typing {
                room_id: RoomId("u1_u2".into()),
                participant_id: pid("u1"),
                is_typing: false,
            })
            .await;
        assert!(pipeline.remote_typing().await);
    }
}
