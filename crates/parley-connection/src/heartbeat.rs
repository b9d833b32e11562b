// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport liveness tracking.
//!
//! A ping is emitted on a fixed interval; the absence of a pong past the
//! configured timeout is a silent failure and forces a reconnect. The
//! tracker itself is clock-free: the manager's run loop feeds it `Instant`s
//! so the logic is testable without timers.

use std::time::{Duration, Instant};

use parley_config::model::HeartbeatConfig;

/// Liveness state for one relay connection.
///
/// Re-initialized on every (re)connect.
#[derive(Debug, Clone)]
pub struct HeartbeatTracker {
    interval: Duration,
    timeout: Duration,
    last_ping_at: Instant,
    last_pong_at: Instant,
}

impl HeartbeatTracker {
    pub fn new(config: &HeartbeatConfig, now: Instant) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
            last_ping_at: now,
            last_pong_at: now,
        }
    }

    /// Interval between outbound pings.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Reset both marks, as on a fresh connection.
    pub fn reset(&mut self, now: Instant) {
        self.last_ping_at = now;
        self.last_pong_at = now;
    }

    /// Record an outbound ping.
    pub fn record_ping(&mut self, now: Instant) {
        self.last_ping_at = now;
    }

    /// Record an inbound pong acknowledgment.
    pub fn record_pong(&mut self, now: Instant) {
        self.last_pong_at = now;
    }

    /// True when no pong has arrived within the timeout: the connection is
    /// silently dead even though the socket has not errored.
    pub fn is_silent(&self, now: Instant) -> bool {
        now.duration_since(self.last_pong_at) > self.timeout
    }
}
