// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime relay transport trait.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::event::RelayEvent;
use crate::traits::auth::Credentials;

/// A bidirectional event channel to the realtime relay.
///
/// One transport carries one authenticated connection. The connection
/// manager owns the transport and layers heartbeat and reconnection on
/// top; transport implementations only move frames.
#[async_trait]
pub trait RelayTransport: Send {
    /// Opens (or re-opens) the connection, authenticated with the
    /// participant's identity and bearer credential.
    async fn connect(&mut self, credentials: &Credentials) -> Result<(), ParleyError>;

    /// Sends one event. Fails with [`ParleyError::Connection`] if the
    /// transport is not connected.
    async fn send(&mut self, event: &RelayEvent) -> Result<(), ParleyError>;

    /// Waits for the next inbound event.
    async fn receive(&mut self) -> Result<RelayEvent, ParleyError>;

    /// Closes the connection. Safe to call when already closed.
    async fn close(&mut self) -> Result<(), ParleyError>;
}
