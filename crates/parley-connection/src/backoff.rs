// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Explicit reconnection backoff policy.
//!
//! The policy is a plain value object: `delay_for(attempt)` is computed
//! without timers so the schedule is testable independent of the clock.
//! Delays grow geometrically from the base, are capped at the maximum, and
//! carry an optional jitter fraction to spread reconnect storms.

use std::time::Duration;

use parley_config::model::ReconnectConfig;
use rand::Rng;

/// Backoff schedule parameters for reconnect attempts.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    base: Duration,
    /// Growth factor per attempt.
    multiplier: f64,
    /// Upper bound on any delay.
    cap: Duration,
    /// Jitter fraction in [0, 1); each delay is scaled by a random factor
    /// in `[1 - jitter, 1 + jitter]`, then re-capped.
    jitter: f64,
    /// Give up after this many consecutive attempts. `None` retries until
    /// explicitly closed.
    max_attempts: Option<u32>,
}

impl BackoffPolicy {
    pub fn new(base: Duration, multiplier: f64, cap: Duration, jitter: f64) -> Self {
        Self {
            base,
            multiplier,
            cap,
            jitter,
            max_attempts: None,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            cap: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
            max_attempts: config.max_attempts,
        }
    }

    /// Whether another attempt is allowed after `attempt` consecutive
    /// failures.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }

    /// Delay before retry number `attempt` (zero-based), without jitter.
    ///
    /// `delay_for(0)` is the base delay; each subsequent attempt multiplies
    /// by the growth factor, saturating at the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(64) as i32);
        let raw_ms = self.base.as_millis() as f64 * factor;
        let capped_ms = raw_ms.min(self.cap.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Delay before retry number `attempt` with jitter applied.
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if self.jitter <= 0.0 {
            return delay;
        }
        let scale = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        let jittered_ms = delay.as_millis() as f64 * scale;
        Duration::from_millis(jittered_ms as u64).min(self.cap)
    }
}
