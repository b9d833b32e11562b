// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local peer-connection engine boundary.

use async_trait::async_trait;

use parley_core::error::ParleyError;
use parley_core::types::{IceCandidate, SessionDescription};

/// The local WebRTC engine as seen by the signaling coordinator.
///
/// Implementations own media capture and the underlying peer connection;
/// the coordinator only drives negotiation. `release_media` must be safe
/// to call more than once.
#[async_trait]
pub trait PeerLink: Send {
    async fn create_offer(&mut self) -> Result<SessionDescription, ParleyError>;

    async fn create_answer(&mut self) -> Result<SessionDescription, ParleyError>;

    async fn set_local_description(
        &mut self,
        description: &SessionDescription,
    ) -> Result<(), ParleyError>;

    async fn set_remote_description(
        &mut self,
        description: &SessionDescription,
    ) -> Result<(), ParleyError>;

    /// Apply one remote network path proposal. Only valid after the remote
    /// description has been set.
    async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), ParleyError>;

    /// Stop capture and free the media devices.
    async fn release_media(&mut self);
}
