// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions.
//!
//! The engine consumes the message store, balance ledger, auth issuer, and
//! realtime relay as black boxes behind these traits. All use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod auth;
pub mod ledger;
pub mod relay;
pub mod store;

// Re-export all traits at the traits module level for convenience.
pub use auth::AuthProvider;
pub use ledger::ConsultationLedger;
pub use relay::RelayTransport;
pub use store::MessageStore;
