// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test doubles for the Parley workspace.
//!
//! Provides a mock relay transport with injectable inbound events and an
//! in-memory message store and ledger implementing the collaborator traits
//! with the same observable semantics as the real backends.

pub mod memory_ledger;
pub mod memory_store;
pub mod mock_relay;

pub use memory_ledger::InMemoryLedger;
pub use memory_store::InMemoryMessageStore;
pub use mock_relay::{MockRelay, MockRelayHandle};
