// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley consultation engine.

use thiserror::Error;

use crate::types::Amount;

/// The primary error type used across all Parley crates.
///
/// Variants map to the failure classes the engine distinguishes for
/// handling: transport failures are retried internally, balance and
/// persistence failures are always surfaced to the caller, and validation
/// failures are rejected before any network call.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Transport-level failures (relay socket, heartbeat loss). Retried
    /// with backoff by the connection manager; surfaced only when retries
    /// are exhausted or the manager is closed.
    #[error("connection error: {message}")]
    Connection {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The prepaid balance cannot cover the next billing block. Never
    /// retried automatically.
    #[error("insufficient balance: need {required}, have {current} (short {shortfall})")]
    InsufficientBalance {
        required: Amount,
        current: Amount,
        shortfall: Amount,
    },

    /// A message-store or ledger write failed. Local optimistic state is
    /// rolled back, never assumed successful.
    #[error("persistence error: {message}")]
    Persistence {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Call setup did not reach the connected state within the bound.
    #[error("signaling timed out after {duration:?}")]
    SignalingTimeout { duration: std::time::Duration },

    /// Malformed input, rejected before any network call.
    #[error("validation error: {0}")]
    Validation(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Convenience constructor for a connection error without a source.
    pub fn connection(message: impl Into<String>) -> Self {
        ParleyError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Convenience constructor for a persistence error without a source.
    pub fn persistence(message: impl Into<String>) -> Self {
        ParleyError::Persistence {
            message: message.into(),
            source: None,
        }
    }

    /// True for failures the connection manager handles internally with
    /// backoff rather than surfacing to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ParleyError::Connection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_message_carries_amounts() {
        let err = ParleyError::InsufficientBalance {
            required: 50,
            current: 40,
            shortfall: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("need 50"), "got: {msg}");
        assert!(msg.contains("have 40"), "got: {msg}");
        assert!(msg.contains("short 10"), "got: {msg}");
    }

    #[test]
    fn only_connection_errors_are_retryable() {
        assert!(ParleyError::connection("socket reset").is_retryable());
        assert!(!ParleyError::persistence("write failed").is_retryable());
        assert!(!ParleyError::Validation("empty content".into()).is_retryable());
        assert!(
            !ParleyError::InsufficientBalance {
                required: 50,
                current: 40,
                shortfall: 10
            }
            .is_retryable()
        );
    }

    #[test]
    fn connection_error_preserves_source() {
        let err = ParleyError::Connection {
            message: "handshake failed".into(),
            source: Some(Box::new(std::io::Error::other("broken pipe"))),
        };
        assert!(std::error::Error::source(&err).is_some());
    }
}
