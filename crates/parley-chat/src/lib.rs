// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat-room message pipeline for the Parley consultation engine.
//!
//! Persist-before-broadcast sends, idempotent history merge, soft deletes
//! and reactions, typing notices, and history reconciliation after relay
//! reconnects.

pub mod pipeline;

pub use pipeline::{ChatPipeline, PendingMessage};
