// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The call signaling state machine.
//!
//! One [`SignalingSession`] brokers one call attempt between two peers
//! through the relay: `idle → offering → offered → connected` on the
//! caller side, `idle → answering → connected` on the callee side, and
//! `closed` from anywhere. A closed session is never reused.
//!
//! ICE candidates race the session descriptions over the same relay, so
//! candidates arriving before the remote description are buffered and
//! flushed in arrival order the moment it is applied.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parley_config::model::SignalingConfig;
use parley_connection::ConnectionManager;
use parley_core::types::{IceCandidate, SdpKind, SessionDescription};
use parley_core::{ParleyError, RelayEvent, RoomId};
use strum::Display;
use tracing::{debug, info, warn};

use crate::peer::PeerLink;

/// Negotiation state of one call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CallState {
    Idle,
    Offering,
    Offered,
    Answering,
    Connected,
    Closed,
}

/// One call attempt. Owns the local peer engine for its lifetime.
pub struct SignalingSession {
    room_id: RoomId,
    peer: Box<dyn PeerLink>,
    connection: Arc<ConnectionManager>,
    state: CallState,
    /// Candidates received before the remote description, in arrival order.
    pending_remote_candidates: VecDeque<IceCandidate>,
    has_remote_description: bool,
    started_at: Instant,
    setup_timeout: Duration,
}

impl SignalingSession {
    pub fn new(
        room_id: RoomId,
        peer: Box<dyn PeerLink>,
        connection: Arc<ConnectionManager>,
        config: &SignalingConfig,
    ) -> Self {
        Self {
            room_id,
            peer,
            connection,
            state: CallState::Idle,
            pending_remote_candidates: VecDeque::new(),
            has_remote_description: false,
            started_at: Instant::now(),
            setup_timeout: Duration::from_secs(config.setup_timeout_secs),
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Number of candidates currently buffered awaiting the remote
    /// description.
    pub fn buffered_candidates(&self) -> usize {
        self.pending_remote_candidates.len()
    }

    /// Caller side: create and send the offer.
    ///
    /// Moves through `offering` while the local description is being set
    /// and lands in `offered` once the relay confirms the send.
    pub async fn start_call(&mut self) -> Result<(), ParleyError> {
        if self.state != CallState::Idle {
            return Err(ParleyError::Validation(format!(
                "cannot start call from state {}",
                self.state
            )));
        }
        self.state = CallState::Offering;

        if let Err(err) = self.send_offer().await {
            warn!(room_id = %self.room_id, error = %err, "offer failed, closing session");
            self.close().await;
            return Err(err);
        }

        self.state = CallState::Offered;
        info!(room_id = %self.room_id, "offer sent");
        Ok(())
    }

    async fn send_offer(&mut self) -> Result<(), ParleyError> {
        let offer = self.peer.create_offer().await?;
        self.peer.set_local_description(&offer).await?;
        self.connection
            .send(RelayEvent::Offer {
                room_id: self.room_id.clone(),
                description: offer,
            })
            .await
    }

    /// Forward one locally-gathered candidate to the remote peer.
    pub async fn send_candidate(&mut self, candidate: IceCandidate) -> Result<(), ParleyError> {
        if self.state == CallState::Closed {
            return Err(ParleyError::Validation(
                "cannot send candidate on a closed session".into(),
            ));
        }
        self.connection
            .send(RelayEvent::IceCandidate {
                room_id: self.room_id.clone(),
                candidate,
            })
            .await
    }

    /// Apply one inbound relay event to the state machine.
    ///
    /// Events that do not match an edge from the current state are logged
    /// and ignored; they never error the session. Events for other rooms
    /// and non-signaling events are ignored silently.
    pub async fn handle_event(&mut self, event: &RelayEvent) -> Result<(), ParleyError> {
        if event.room_id().is_some_and(|room| room != &self.room_id) {
            return Ok(());
        }
        match event {
            RelayEvent::Offer { description, .. } => self.handle_offer(description).await,
            RelayEvent::Answer { description, .. } => self.handle_answer(description).await,
            RelayEvent::IceCandidate { candidate, .. } => {
                self.handle_candidate(candidate).await;
                Ok(())
            }
            RelayEvent::Hangup { .. } => {
                info!(room_id = %self.room_id, "remote hung up");
                self.close().await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Callee side: an offer arrived. Valid only while `idle`.
    async fn handle_offer(&mut self, description: &SessionDescription) -> Result<(), ParleyError> {
        if self.state != CallState::Idle {
            warn!(room_id = %self.room_id, state = %self.state, "offer ignored");
            return Ok(());
        }
        if description.kind != SdpKind::Offer {
            warn!(room_id = %self.room_id, "offer event carried a non-offer description");
            return Ok(());
        }
        self.state = CallState::Answering;

        if let Err(err) = self.answer_offer(description).await {
            warn!(room_id = %self.room_id, error = %err, "answering failed, closing session");
            self.close().await;
            return Err(err);
        }

        self.state = CallState::Connected;
        info!(room_id = %self.room_id, "answer sent, call connected");
        Ok(())
    }

    async fn answer_offer(&mut self, description: &SessionDescription) -> Result<(), ParleyError> {
        self.peer.set_remote_description(description).await?;
        self.mark_remote_description_set().await;

        let answer = self.peer.create_answer().await?;
        self.peer.set_local_description(&answer).await?;
        self.connection
            .send(RelayEvent::Answer {
                room_id: self.room_id.clone(),
                description: answer,
            })
            .await
    }

    /// Caller side: the answer arrived. Valid only while `offered`.
    async fn handle_answer(&mut self, description: &SessionDescription) -> Result<(), ParleyError> {
        if self.state != CallState::Offered {
            warn!(room_id = %self.room_id, state = %self.state, "answer ignored");
            return Ok(());
        }
        if description.kind != SdpKind::Answer {
            warn!(room_id = %self.room_id, "answer event carried a non-answer description");
            return Ok(());
        }
        if let Err(err) = self.apply_answer(description).await {
            warn!(room_id = %self.room_id, error = %err, "answer rejected, closing session");
            self.close().await;
            return Err(err);
        }

        self.state = CallState::Connected;
        info!(room_id = %self.room_id, "answer applied, call connected");
        Ok(())
    }

    async fn apply_answer(&mut self, description: &SessionDescription) -> Result<(), ParleyError> {
        self.peer.set_remote_description(description).await?;
        self.mark_remote_description_set().await;
        Ok(())
    }

    /// Apply a remote candidate, or buffer it while the remote description
    /// is still outstanding.
    async fn handle_candidate(&mut self, candidate: &IceCandidate) {
        if self.state == CallState::Closed {
            debug!(room_id = %self.room_id, "candidate for closed session dropped");
            return;
        }
        if !self.has_remote_description {
            self.pending_remote_candidates.push_back(candidate.clone());
            debug!(
                room_id = %self.room_id,
                buffered = self.pending_remote_candidates.len(),
                "candidate buffered before remote description"
            );
            return;
        }
        if let Err(err) = self.peer.add_ice_candidate(candidate).await {
            warn!(room_id = %self.room_id, error = %err, "candidate rejected by peer engine");
        }
    }

    /// Flush the candidate buffer in arrival order now that the remote
    /// description is applied.
    async fn mark_remote_description_set(&mut self) {
        self.has_remote_description = true;
        let flushed = self.pending_remote_candidates.len();
        while let Some(candidate) = self.pending_remote_candidates.pop_front() {
            if let Err(err) = self.peer.add_ice_candidate(&candidate).await {
                warn!(room_id = %self.room_id, error = %err, "buffered candidate rejected");
            }
        }
        if flushed > 0 {
            debug!(room_id = %self.room_id, flushed, "candidate buffer flushed");
        }
    }

    /// Tear the session down if it has not connected within the setup
    /// window. `now` is injected so callers (and tests) control the clock.
    pub async fn enforce_setup_timeout(&mut self, now: Instant) -> Result<(), ParleyError> {
        if matches!(self.state, CallState::Connected | CallState::Closed) {
            return Ok(());
        }
        if now.duration_since(self.started_at) < self.setup_timeout {
            return Ok(());
        }
        warn!(room_id = %self.room_id, timeout_secs = self.setup_timeout.as_secs(),
            "call setup timed out");
        self.close().await;
        Err(ParleyError::SignalingTimeout {
            duration: self.setup_timeout,
        })
    }

    /// Notify the remote side, then tear down locally.
    pub async fn hang_up(&mut self) -> Result<(), ParleyError> {
        if self.state == CallState::Closed {
            return Ok(());
        }
        // Best effort: local teardown proceeds even if the relay is down.
        if let Err(err) = self
            .connection
            .send(RelayEvent::Hangup {
                room_id: self.room_id.clone(),
            })
            .await
        {
            warn!(room_id = %self.room_id, error = %err, "hangup notify failed");
        }
        self.close().await;
        Ok(())
    }

    /// Release media, drop buffered candidates, move to `closed`.
    /// Idempotent; a fresh session is required for another call.
    pub async fn close(&mut self) {
        if self.state == CallState::Closed {
            return;
        }
        self.peer.release_media().await;
        self.pending_remote_candidates.clear();
        self.state = CallState::Closed;
        debug!(room_id = %self.room_id, "signaling session closed");
    }
}
