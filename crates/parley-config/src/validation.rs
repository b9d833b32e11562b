// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as URL schemes and backoff parameter ranges.

use crate::model::ParleyConfig;
use crate::ConfigError;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)`
/// with all collected validation errors (does not fail fast).
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let relay_url = config.relay.url.trim();
    if relay_url.is_empty() {
        errors.push(ConfigError::Validation {
            message: "relay.url must not be empty".to_string(),
        });
    } else if !relay_url.starts_with("ws://") && !relay_url.starts_with("wss://") {
        errors.push(ConfigError::Validation {
            message: format!("relay.url `{relay_url}` must use ws:// or wss://"),
        });
    }

    let backend_url = config.backend.base_url.trim();
    if backend_url.is_empty() {
        errors.push(ConfigError::Validation {
            message: "backend.base_url must not be empty".to_string(),
        });
    } else if !backend_url.starts_with("http://") && !backend_url.starts_with("https://") {
        errors.push(ConfigError::Validation {
            message: format!("backend.base_url `{backend_url}` must use http:// or https://"),
        });
    }

    if config.reconnect.multiplier < 1.0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "reconnect.multiplier must be at least 1.0, got {}",
                config.reconnect.multiplier
            ),
        });
    }

    if !(0.0..1.0).contains(&config.reconnect.jitter) {
        errors.push(ConfigError::Validation {
            message: format!(
                "reconnect.jitter must be in [0, 1), got {}",
                config.reconnect.jitter
            ),
        });
    }

    if config.reconnect.base_delay_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "reconnect.base_delay_ms must be positive".to_string(),
        });
    }

    if config.reconnect.max_delay_ms < config.reconnect.base_delay_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "reconnect.max_delay_ms ({}) must be >= reconnect.base_delay_ms ({})",
                config.reconnect.max_delay_ms, config.reconnect.base_delay_ms
            ),
        });
    }

    if config.heartbeat.timeout_secs <= config.heartbeat.interval_secs {
        errors.push(ConfigError::Validation {
            message: format!(
                "heartbeat.timeout_secs ({}) must exceed heartbeat.interval_secs ({})",
                config.heartbeat.timeout_secs, config.heartbeat.interval_secs
            ),
        });
    }

    if config.billing.minimum_block_minutes == 0 {
        errors.push(ConfigError::Validation {
            message: "billing.minimum_block_minutes must be positive".to_string(),
        });
    }

    if config.signaling.setup_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "signaling.setup_timeout_secs must be positive".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ParleyConfig::default()).is_ok());
    }

    #[test]
    fn bad_relay_scheme_rejected() {
        let mut config = ParleyConfig::default();
        config.relay.url = "http://relay.example.test".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("relay.url")));
    }

    #[test]
    fn zero_block_minutes_rejected() {
        let mut config = ParleyConfig::default();
        config.billing.minimum_block_minutes = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn collects_all_errors_not_just_first() {
        let mut config = ParleyConfig::default();
        config.relay.url = String::new();
        config.reconnect.multiplier = 0.5;
        config.heartbeat.timeout_secs = config.heartbeat.interval_secs;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 3, "got {} errors", errors.len());
    }

    #[test]
    fn jitter_bounds_enforced() {
        let mut config = ParleyConfig::default();
        config.reconnect.jitter = 1.0;
        assert!(validate_config(&config).is_err());
        config.reconnect.jitter = 0.0;
        assert!(validate_config(&config).is_ok());
    }
}
