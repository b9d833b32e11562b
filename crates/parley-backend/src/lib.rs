// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend collaborator clients for the Parley engine.
//!
//! [`BackendClient`] speaks the backend's REST API and plugs into the rest
//! of the workspace through the `MessageStore` and `ConsultationLedger`
//! traits.

pub mod client;

pub use client::BackendClient;
