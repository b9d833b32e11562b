// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relay connection management for the Parley consultation engine.
//!
//! One [`ConnectionManager`] owns one authenticated transport per client,
//! with heartbeat liveness checks, exponential-backoff reconnection, and
//! idempotent room re-join after recovery.

pub mod backoff;
pub mod heartbeat;
pub mod manager;
pub mod ws;

pub use backoff::BackoffPolicy;
pub use heartbeat::HeartbeatTracker;
pub use manager::{ConnectionManager, ConnectionSignal};
pub use ws::WsTransport;
