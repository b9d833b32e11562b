// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call signaling for the Parley consultation engine.
//!
//! Brokers WebRTC session setup between two peers over the realtime relay:
//! offer/answer exchange, ICE candidate forwarding with pre-description
//! buffering, hangup propagation, and setup-timeout teardown. The local
//! media engine sits behind the [`PeerLink`] trait.

pub mod peer;
pub mod session;

pub use peer::PeerLink;
pub use session::{CallState, SignalingSession};
