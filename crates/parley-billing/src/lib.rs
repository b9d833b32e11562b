// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consultation billing for the Parley engine.
//!
//! Block-based prepaid metering: start reserves a minimum block against the
//! client's balance, extensions re-check and grow the reservation, and
//! ending settles actual elapsed time with the unused remainder refunded.
//! The ledger collaborator holds all money; this crate only orchestrates.

pub mod engine;

pub use engine::{BillingEngine, elapsed_minutes};
