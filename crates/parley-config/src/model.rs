// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parley consultation engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Engine identity and logging settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Realtime relay connection settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Reconnection backoff settings.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Heartbeat settings.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Billing block settings.
    #[serde(default)]
    pub billing: BillingConfig,

    /// Call signaling settings.
    #[serde(default)]
    pub signaling: SignalingConfig,

    /// Message store / ledger backend settings.
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Engine identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Display name reported in typing notices and logs.
    #[serde(default = "default_display_name")]
    pub display_name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            log_level: default_log_level(),
        }
    }
}

/// Realtime relay connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// WebSocket URL of the realtime relay.
    #[serde(default = "default_relay_url")]
    pub url: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: default_relay_url(),
        }
    }
}

/// Reconnection backoff configuration.
///
/// Delays double from `base_delay_ms` up to `max_delay_ms`, with an
/// optional jitter fraction applied to each delay.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    /// First retry delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Multiplier applied per attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Cap on the retry delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter fraction in [0, 1) applied to each delay.
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Give up after this many consecutive failed attempts.
    /// `None` retries until explicit close.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            max_attempts: None,
        }
    }
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatConfig {
    /// Interval between ping frames in seconds.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub interval_secs: u64,

    /// A missing pong past this many seconds is a silent failure and
    /// forces a reconnect.
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_heartbeat_interval_secs(),
            timeout_secs: default_heartbeat_timeout_secs(),
        }
    }
}

/// Billing block configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BillingConfig {
    /// Minutes reserved per billing block on start and extend.
    #[serde(default = "default_minimum_block_minutes")]
    pub minimum_block_minutes: u32,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            minimum_block_minutes: default_minimum_block_minutes(),
        }
    }
}

/// Call signaling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SignalingConfig {
    /// A call that has not reached the connected state within this many
    /// seconds is torn down and reported as a connection failure.
    #[serde(default = "default_setup_timeout_secs")]
    pub setup_timeout_secs: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            setup_timeout_secs: default_setup_timeout_secs(),
        }
    }
}

/// Message store / ledger backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the REST backend serving the message store and ledger.
    #[serde(default = "default_backend_base_url")]
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_base_url(),
        }
    }
}

fn default_display_name() -> String {
    "parley".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_relay_url() -> String {
    "wss://relay.parley.local/ws".to_string()
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.1
}

fn default_heartbeat_interval_secs() -> u64 {
    25
}

fn default_heartbeat_timeout_secs() -> u64 {
    60
}

fn default_minimum_block_minutes() -> u32 {
    5
}

fn default_setup_timeout_secs() -> u64 {
    30
}

fn default_backend_base_url() -> String {
    "https://api.parley.local".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ParleyConfig::default();
        assert_eq!(config.engine.log_level, "info");
        assert_eq!(config.reconnect.base_delay_ms, 1_000);
        assert_eq!(config.reconnect.max_delay_ms, 30_000);
        assert!(config.reconnect.max_attempts.is_none());
        assert_eq!(config.heartbeat.interval_secs, 25);
        assert_eq!(config.billing.minimum_block_minutes, 5);
        assert_eq!(config.signaling.setup_timeout_secs, 30);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let toml = "[billing]\nminimum_block_minutes = 5\nmaximum_block = 10\n";
        let result: Result<ParleyConfig, _> = toml::from_str(toml);
        assert!(result.is_err(), "unknown key should be rejected");
    }
}
